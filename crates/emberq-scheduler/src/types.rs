use serde::{Deserialize, Serialize};

use emberq_core::JobOptions;

/// Whether an upsert rewrites the whole definition or only advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Replace `data` / `opts` / `name` and all scheduling fields, then
    /// enqueue the next instance.
    Override,
    /// Leave the stored definition untouched; only move the next-fire score
    /// and enqueue the next instance. A no-op when the definition is missing.
    AdvanceOnly,
}

impl UpsertMode {
    pub fn is_override(self) -> bool {
        matches!(self, UpsertMode::Override)
    }
}

/// Decoded view of one scheduler, as returned by the read APIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerJson {
    /// The scheduler id.
    pub key: String,
    /// Job name emitted per instance.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<i64>,
    /// Next fire time, from the index score at read time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
    /// Payload and options template the instances are stamped from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SchedulerTemplate>,
}

/// Stored instance template: payload plus job options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<JobOptions>,
}
