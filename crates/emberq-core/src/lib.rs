//! `emberq-core` — the queue layer shared by producers, workers and the
//! scheduler.
//!
//! Everything that must agree across processes lives here: the key layout of
//! the Redis namespace, the job record and options codec, the injectable wall
//! clock, and configuration loading. The scheduler itself is in
//! `emberq-scheduler`; workers and producers link only against this crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod keys;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{QueueConfig, QueueSettings, RedisConfig};
pub use error::{QueueError, Result};
pub use job::{Job, JobOptions, RepeatOptions};
pub use keys::KeySpace;
