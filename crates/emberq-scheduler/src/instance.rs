//! Construction of the concrete job instance a scheduler emits per fire.
//!
//! The instance is fully computed here — id, delay, timestamps, merged
//! options — and handed to the atomic scripts as plain arguments, so the
//! store-side append stays a dumb write.

use emberq_core::{JobOptions, KeySpace, RepeatOptions};

use crate::error::Result;

/// One dated instance, ready to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NextInstance {
    /// Deterministic `repeat:<schedulerId>:<ms>` id.
    pub job_id: String,
    /// Milliseconds until the instance becomes runnable.
    pub delay: i64,
    /// Creation wall time, epoch ms.
    pub timestamp: i64,
    /// Fully merged job options, serialized.
    pub opts_json: String,
    /// The merged options themselves, for the returned job handle.
    pub opts: JobOptions,
}

/// Build the next instance for `scheduler_id` firing at `next_millis`.
///
/// `published_offset` is the phase offset derived on an interval first fire;
/// it is stamped into the instance's repeat metadata so the following upsert
/// reuses it. `iteration_count` is 1-based: the instance being created.
pub(crate) fn build_next_instance(
    scheduler_id: &str,
    next_millis: i64,
    template: &JobOptions,
    repeat: &RepeatOptions,
    iteration_count: u32,
    published_offset: Option<i64>,
    now_ms: i64,
) -> Result<NextInstance> {
    let job_id = KeySpace::instance_id(scheduler_id, next_millis);
    let delay = (next_millis - now_ms).max(0);

    let mut opts = template.clone();
    opts.job_id = Some(job_id.clone());
    opts.delay = Some(delay);
    opts.timestamp = Some(now_ms);
    opts.prev_millis = Some(next_millis);
    opts.repeat_job_key = Some(scheduler_id.to_string());
    opts.repeat = Some(instance_repeat(repeat, iteration_count, published_offset));

    let opts_json = opts.as_json()?;
    Ok(NextInstance {
        job_id,
        delay,
        timestamp: now_ms,
        opts_json,
        opts,
    })
}

/// Repeat metadata carried on the instance: the caller's options minus the
/// one-shot `immediately` flag, with the iteration count and (interval form)
/// the current phase offset stamped in.
fn instance_repeat(
    repeat: &RepeatOptions,
    iteration_count: u32,
    published_offset: Option<i64>,
) -> RepeatOptions {
    let mut carried = repeat.clone();
    carried.immediately = false;
    carried.count = Some(iteration_count);
    if published_offset.is_some() {
        carried.offset = published_offset;
    }
    carried
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_deterministic_id_and_delay() {
        let instance = build_next_instance(
            "s1",
            3000,
            &JobOptions::default(),
            &RepeatOptions {
                every: Some(1000),
                ..Default::default()
            },
            2,
            None,
            1500,
        )
        .unwrap();

        assert_eq!(instance.job_id, "repeat:s1:3000");
        assert_eq!(instance.delay, 1500);
        assert_eq!(instance.timestamp, 1500);
        assert_eq!(instance.opts.prev_millis, Some(3000));
        assert_eq!(instance.opts.repeat_job_key.as_deref(), Some("s1"));
        assert_eq!(instance.opts.repeat.as_ref().unwrap().count, Some(2));
    }

    #[test]
    fn delay_never_goes_negative() {
        let instance = build_next_instance(
            "s1",
            1000,
            &JobOptions::default(),
            &RepeatOptions::default(),
            1,
            None,
            5000,
        )
        .unwrap();
        assert_eq!(instance.delay, 0);
    }

    #[test]
    fn published_offset_is_stamped_into_repeat_metadata() {
        let instance = build_next_instance(
            "s1",
            1000,
            &JobOptions::default(),
            &RepeatOptions {
                every: Some(1000),
                ..Default::default()
            },
            1,
            Some(1000),
            1000,
        )
        .unwrap();
        let repeat = instance.opts.repeat.unwrap();
        assert_eq!(repeat.offset, Some(1000));
        assert_eq!(repeat.count, Some(1));
    }

    #[test]
    fn immediately_flag_is_not_carried_onto_instances() {
        let instance = build_next_instance(
            "s1",
            1000,
            &JobOptions::default(),
            &RepeatOptions {
                pattern: Some("* * * * *".into()),
                immediately: true,
                ..Default::default()
            },
            1,
            None,
            1000,
        )
        .unwrap();
        assert!(!instance.opts.repeat.unwrap().immediately);
    }

    #[test]
    fn template_fields_survive_the_merge() {
        let template = JobOptions {
            priority: Some(5),
            attempts: Some(3),
            ..Default::default()
        };
        let instance = build_next_instance(
            "s1",
            2000,
            &template,
            &RepeatOptions::default(),
            1,
            None,
            1000,
        )
        .unwrap();
        assert_eq!(instance.opts.priority, Some(5));
        assert_eq!(instance.opts.attempts, Some(3));
    }
}
