//! `emberq-scheduler` — materializes repeating job definitions into dated,
//! individually-executable job instances.
//!
//! # Overview
//!
//! A scheduler is a persisted definition: "emit job `name` with payload
//! `data` on schedule `repeat`". Each successful
//! [`JobScheduler::upsert_job_scheduler`] advances the definition by one tick
//! and enqueues exactly one next instance into the shared delayed set, as a
//! single server-side transaction. There is no background loop — workers call
//! upsert again when an instance completes, which is what keeps the stream
//! going and what makes catch-up after a pause automatic.
//!
//! # Schedule forms
//!
//! | Form      | Behaviour                                                  |
//! |-----------|------------------------------------------------------------|
//! | `every`   | Fixed-interval slots with a phase offset published on the first fire |
//! | `pattern` | Cron expression, optionally evaluated in an IANA timezone  |
//!
//! # Storage layout
//!
//! Under the shared `<prefix>:<queue>` namespace:
//!
//! | Key                      | Entity                                       |
//! |--------------------------|----------------------------------------------|
//! | `…:repeat`               | zset of scheduler ids scored by next fire ms |
//! | `…:repeat:<id>`          | definition hash                              |
//! | `…:delayed`              | zset of delayed job ids                      |
//! | `…:repeat:<id>:<ms>`     | instance job hash (deterministic id)         |

pub mod error;
mod instance;
pub mod scheduler;
mod scripts;
pub mod strategy;
pub mod types;

pub use error::{Result, SchedulerError};
pub use scheduler::JobScheduler;
pub use strategy::{default_pattern_strategy, RepeatStrategy};
pub use types::{SchedulerJson, SchedulerTemplate, UpsertMode};
