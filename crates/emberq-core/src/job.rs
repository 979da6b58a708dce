//! Job records and options — the data model shared by producers, workers and
//! the scheduler.
//!
//! Stored JSON uses camelCase keys: the Redis namespace is shared with
//! producers written in other languages, so the wire layout is fixed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// How a repeating definition fires.
///
/// Exactly one of `every` / `pattern` is set; the scheduler rejects anything
/// else before touching the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatOptions {
    /// Fixed interval between fires, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<i64>,

    /// Cron-like calendar expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// IANA timezone the pattern is evaluated in. UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,

    /// Fire the first instance right away instead of at the next occurrence.
    /// Mutually exclusive with `start_date`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub immediately: bool,

    /// Epoch ms before which no instance fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,

    /// Epoch ms after which the definition stops emitting (inclusive bound).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,

    /// Maximum number of instances to emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Instances already emitted (the scheduler writes `count = iteration`
    /// into each instance it creates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Phase offset for interval schedules, published back on the first fire
    /// so later slots keep a stable phase relative to the start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Per-job options. A subset is stored on a scheduler definition as the
/// template for the instances it emits; the rest is filled per instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Custom job id. Producers may leave it unset; the scheduler always
    /// supplies a deterministic `repeat:<schedulerId>:<ms>` id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Milliseconds the job waits in the delayed set before becoming runnable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,

    /// Creation wall time, epoch ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Fire time of the most recent instance this job descends from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_millis: Option<i64>,

    /// Back-reference to the scheduler that emitted this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_job_key: Option<String>,

    /// Repeat metadata carried on emitted instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl JobOptions {
    /// Serialize for storage in a definition or job hash.
    pub fn as_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode options previously written with [`JobOptions::as_json`].
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The form stored on a scheduler definition: per-instance fields
    /// (`delay`, `job_id`, `timestamp`) are cleared and filled at fire time.
    pub fn as_template(&self) -> JobOptions {
        let mut template = self.clone();
        template.delay = None;
        template.job_id = None;
        template.timestamp = None;
        template
    }
}

/// A concrete job handle, as returned to callers after an enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    pub data: serde_json::Value,
    pub opts: JobOptions,
    /// Creation wall time, epoch ms.
    pub timestamp: i64,
    /// Milliseconds until the job becomes runnable. 0 means immediately.
    pub delay: i64,
    /// Set on instances emitted by a scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_job_key: Option<String>,
}

impl Job {
    /// Build a job record for a plain producer enqueue. A random id is
    /// assigned when the options carry no custom one.
    pub fn new(name: &str, data: serde_json::Value, opts: JobOptions, now_ms: i64) -> Self {
        let id = opts
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let delay = opts.delay.unwrap_or(0).max(0);
        Self {
            id,
            name: name.to_string(),
            data,
            opts,
            timestamp: now_ms,
            delay,
            repeat_job_key: None,
        }
    }
}
