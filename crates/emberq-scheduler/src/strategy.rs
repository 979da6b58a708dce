//! Next-fire computation for repeating definitions.
//!
//! Two built-in forms:
//!
//! | Form     | Behaviour                                                    |
//! |----------|--------------------------------------------------------------|
//! | `every`  | Fixed-interval slots aligned to a phase offset published on the first fire |
//! | `pattern`| Cron expression, evaluated in the definition's timezone      |
//!
//! The pattern evaluator is pluggable: callers with custom calendars install
//! their own [`RepeatStrategy`] function on the scheduler. The interval form
//! is plain clock arithmetic and is not replaceable.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cron::Schedule;

use emberq_core::RepeatOptions;

/// Pure function `(now_ms, repeat options, job name) -> next fire ms`.
///
/// `None` means the schedule is dead (no future occurrence); the upsert
/// becomes a silent no-op. Implementations must be reentrant and must not
/// mutate shared state.
pub type RepeatStrategy = Arc<dyn Fn(i64, &RepeatOptions, Option<&str>) -> Option<i64> + Send + Sync>;

/// Result of an interval computation. `published_offset` is set only on the
/// first fire, when the phase offset is derived and must be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntervalFire {
    pub next_millis: i64,
    pub published_offset: Option<i64>,
}

/// Fixed-interval form.
///
/// The first fire (no previous fire, no stored offset) runs at `now` and
/// publishes `offset = next_slot - now` so later slots keep a stable phase
/// relative to that start. When `now` already sits on a slot boundary the
/// published offset equals `every`, which makes subsequent fires land one
/// full period past the boundary — observable behaviour kept as-is, pinned
/// by test.
pub(crate) fn interval_next_millis(
    now_ms: i64,
    every: i64,
    prev_millis: i64,
    offset: Option<i64>,
) -> IntervalFire {
    let next_slot = (now_ms / every) * every + every;
    if prev_millis > 0 || offset.is_some() {
        let next = next_slot + offset.unwrap_or(0);
        IntervalFire {
            // never emit in the past: catch up to now on drift
            next_millis: next.max(now_ms),
            published_offset: None,
        }
    } else {
        IntervalFire {
            next_millis: now_ms,
            published_offset: Some(next_slot - now_ms),
        }
    }
}

/// Default cron-pattern evaluator.
///
/// `immediately` short-circuits to `now`. Otherwise the expression is parsed
/// with `now` as the anchor and the next occurrence is returned, evaluated in
/// the definition's IANA timezone when one is set. Any parse or iteration
/// failure yields `None`.
pub fn default_pattern_strategy(
    now_ms: i64,
    opts: &RepeatOptions,
    _job_name: Option<&str>,
) -> Option<i64> {
    if opts.immediately {
        return Some(now_ms);
    }
    let pattern = opts.pattern.as_deref()?;
    let schedule = Schedule::from_str(&normalize_pattern(pattern)).ok()?;
    let after = Utc.timestamp_millis_opt(now_ms).single()?;

    match opts.tz.as_deref() {
        Some(name) => {
            let tz: chrono_tz::Tz = name.parse().ok()?;
            schedule
                .after(&after.with_timezone(&tz))
                .next()
                .map(|dt| dt.timestamp_millis())
        }
        None => schedule.after(&after).next().map(|dt| dt.timestamp_millis()),
    }
}

/// The wire format is the classic 5-field `MIN HOUR DOM MON DOW`; the parser
/// wants a leading seconds field, so one is prepended when absent.
fn normalize_pattern(pattern: &str) -> String {
    if pattern.split_whitespace().count() == 5 {
        format!("0 {pattern}")
    } else {
        pattern.to_string()
    }
}
