//! Key derivation over the shared Redis namespace.
//!
//! Every queue entity lives under `<prefix>:<queue>:…`. Producers, workers
//! and the scheduler all derive keys through [`KeySpace`] so the layout is
//! defined exactly once.

/// Namespaced key builder for one queue.
#[derive(Debug, Clone)]
pub struct KeySpace {
    base: String,
    queue: String,
}

impl KeySpace {
    pub fn new(prefix: &str, queue: &str) -> Self {
        Self {
            base: format!("{prefix}:{queue}"),
            queue: queue.to_string(),
        }
    }

    /// Queue name this keyspace was derived for.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Key prefix shared by every job hash: `<prefix>:<queue>:`.
    pub fn job_prefix(&self) -> String {
        format!("{}:", self.base)
    }

    /// Sorted set of scheduler ids scored by next fire time.
    pub fn repeat_index(&self) -> String {
        format!("{}:repeat", self.base)
    }

    /// Hash holding one scheduler definition.
    pub fn scheduler(&self, scheduler_id: &str) -> String {
        format!("{}:repeat:{scheduler_id}", self.base)
    }

    /// Sorted set of delayed job ids scored by the instant they become runnable.
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.base)
    }

    /// Hash holding one job record.
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:{job_id}", self.base)
    }

    /// Deterministic id for the instance a scheduler emits at `next_millis`.
    ///
    /// The id doubles as the dedup guard: two upserts racing on the same fire
    /// time collide on this id instead of double-enqueueing.
    pub fn instance_id(scheduler_id: &str, next_millis: i64) -> String {
        format!("repeat:{scheduler_id}:{next_millis}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_namespaced_keys() {
        let keys = KeySpace::new("emberq", "mail");
        assert_eq!(keys.repeat_index(), "emberq:mail:repeat");
        assert_eq!(keys.scheduler("daily-digest"), "emberq:mail:repeat:daily-digest");
        assert_eq!(keys.delayed(), "emberq:mail:delayed");
        assert_eq!(keys.job("repeat:daily-digest:1000"), "emberq:mail:repeat:daily-digest:1000");
        assert_eq!(keys.job_prefix(), "emberq:mail:");
    }

    #[test]
    fn instance_id_is_deterministic() {
        assert_eq!(KeySpace::instance_id("s1", 1000), "repeat:s1:1000");
        assert_eq!(KeySpace::instance_id("s1", 1000), KeySpace::instance_id("s1", 1000));
    }
}
