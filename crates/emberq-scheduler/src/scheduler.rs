//! Scheduler core: validation, timing, script selection and instance
//! creation behind the public upsert/remove/get/list API.
//!
//! The scheduler owns no worker threads — every method is an ordinary async
//! procedure, and all mutation is serialized through the server-side scripts
//! in [`crate::scripts`]. Concurrent callers are safe from any task.

use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{info, instrument, warn, Span};

use emberq_core::{Clock, Job, JobOptions, KeySpace, QueueConfig, RepeatOptions, SystemClock};

use crate::error::{Result, SchedulerError};
use crate::instance::{build_next_instance, NextInstance};
use crate::scripts::SchedulerScripts;
use crate::strategy::{default_pattern_strategy, interval_next_millis, RepeatStrategy};
use crate::types::{SchedulerJson, SchedulerTemplate, UpsertMode};

/// Handle over the scheduler set of one queue.
///
/// All methods take `&self`; the underlying connection is multiplexed and
/// cloned internally per call, so one handle serves any number of tasks.
pub struct JobScheduler {
    conn: MultiplexedConnection,
    keys: KeySpace,
    scripts: SchedulerScripts,
    clock: Arc<dyn Clock>,
    pattern_strategy: RepeatStrategy,
}

/// Definition fields written on an override upsert, serialized for the
/// add script. camelCase keys: the hash layout is shared across languages.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionFields<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tz: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    every: Option<i64>,
}

/// Everything decided before the store is touched.
#[derive(Debug)]
struct UpsertPlan {
    next_millis: i64,
    instance: NextInstance,
}

impl JobScheduler {
    /// Connect to the store described by `config`.
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        let keys = KeySpace::new(&config.queue.prefix, &config.queue.name);
        Ok(Self::with_connection(conn, keys))
    }

    /// Wrap an already-open connection.
    pub fn with_connection(conn: MultiplexedConnection, keys: KeySpace) -> Self {
        Self {
            conn,
            keys,
            scripts: SchedulerScripts::new(),
            clock: Arc::new(SystemClock),
            pattern_strategy: Arc::new(default_pattern_strategy),
        }
    }

    /// Replace the wall clock. Tests pin time this way.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the cron-pattern evaluator with a custom calendar. The
    /// function must be reentrant and must not mutate shared state.
    pub fn with_repeat_strategy(mut self, strategy: RepeatStrategy) -> Self {
        self.pattern_strategy = strategy;
        self
    }

    /// Create or advance a repeating definition and enqueue its next
    /// instance, atomically.
    ///
    /// Returns `Ok(None)` when the definition has nothing left to emit:
    /// iteration limit reached, end date passed, dead pattern, or (in
    /// [`UpsertMode::AdvanceOnly`]) the definition is missing.
    #[instrument(
        name = "upsert_job_scheduler",
        skip_all,
        fields(
            scheduler.id = %scheduler_id,
            job.id = tracing::field::Empty,
            otel.name = tracing::field::Empty,
        )
    )]
    pub async fn upsert_job_scheduler(
        &self,
        scheduler_id: &str,
        repeat: &RepeatOptions,
        job_name: &str,
        job_data: &serde_json::Value,
        template: &JobOptions,
        mode: UpsertMode,
    ) -> Result<Option<Job>> {
        let span = Span::current();
        span.record(
            "otel.name",
            format!("add {}.{}", self.keys.queue(), job_name).as_str(),
        );

        let Some(plan) = plan_upsert(
            self.clock.as_ref(),
            &self.pattern_strategy,
            scheduler_id,
            repeat,
            job_name,
            template,
        )?
        else {
            return Ok(None);
        };

        let data_json = serde_json::to_string(job_data)?;
        let mut conn = self.conn.clone();

        let reply: redis::Value = match mode {
            UpsertMode::Override => {
                let def = DefinitionFields {
                    name: job_name,
                    end_date: repeat.end_date,
                    tz: repeat.tz.as_deref(),
                    pattern: repeat.pattern.as_deref(),
                    every: repeat.every,
                };
                self.scripts
                    .add
                    .key(self.keys.repeat_index())
                    .key(self.keys.scheduler(scheduler_id))
                    .key(self.keys.delayed())
                    .key(self.keys.job(&plan.instance.job_id))
                    .arg(scheduler_id)
                    .arg(plan.next_millis)
                    .arg(serde_json::to_string(&def)?)
                    .arg(&data_json)
                    .arg(template.as_template().as_json()?)
                    .arg(&plan.instance.job_id)
                    .arg(&plan.instance.opts_json)
                    .arg(plan.instance.delay)
                    .arg(plan.instance.timestamp)
                    .arg(self.keys.job_prefix())
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|e| wrap_upsert_error(scheduler_id, e))?
            }
            UpsertMode::AdvanceOnly => self
                .scripts
                .update_next
                .key(self.keys.repeat_index())
                .key(self.keys.scheduler(scheduler_id))
                .key(self.keys.delayed())
                .key(self.keys.job(&plan.instance.job_id))
                .arg(scheduler_id)
                .arg(plan.next_millis)
                .arg(job_name)
                .arg(&data_json)
                .arg(&plan.instance.job_id)
                .arg(&plan.instance.opts_json)
                .arg(plan.instance.delay)
                .arg(plan.instance.timestamp)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| wrap_upsert_error(scheduler_id, e))?,
        };

        match reply {
            // AdvanceOnly on an id that is not indexed: definition missing,
            // nothing was created.
            redis::Value::Nil => Ok(None),
            redis::Value::Int(-1) => Err(SchedulerError::Upsert {
                scheduler_id: scheduler_id.to_string(),
                reason: format!("a job with id {} already exists", plan.instance.job_id),
            }),
            redis::Value::BulkString(_) | redis::Value::SimpleString(_) => {
                span.record("job.id", plan.instance.job_id.as_str());
                info!(
                    queue = %self.keys.queue(),
                    job_name,
                    next_millis = plan.next_millis,
                    "job scheduler upserted"
                );
                Ok(Some(Job {
                    id: plan.instance.job_id.clone(),
                    name: job_name.to_string(),
                    data: job_data.clone(),
                    opts: plan.instance.opts.clone(),
                    timestamp: plan.instance.timestamp,
                    delay: plan.instance.delay,
                    repeat_job_key: Some(scheduler_id.to_string()),
                }))
            }
            other => Err(SchedulerError::Upsert {
                scheduler_id: scheduler_id.to_string(),
                reason: format!("unexpected script reply: {other:?}"),
            }),
        }
    }

    /// Delete a scheduler: definition, index entry, and its pending instance.
    /// Returns the number of schedulers removed (0 or 1).
    #[instrument(skip(self), fields(scheduler.id = %scheduler_id))]
    pub async fn remove_job_scheduler(&self, scheduler_id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .scripts
            .remove
            .key(self.keys.repeat_index())
            .key(self.keys.scheduler(scheduler_id))
            .key(self.keys.delayed())
            .arg(scheduler_id)
            .arg(self.keys.job_prefix())
            .invoke_async(&mut conn)
            .await?;
        if removed > 0 {
            info!("job scheduler removed");
        }
        Ok(removed)
    }

    /// Atomic read of one scheduler. `None` when the id is fully unknown.
    ///
    /// Definitions created before the hash layout existed have no stored
    /// fields; for those the descriptor is synthesized from the legacy
    /// colon-delimited key format.
    pub async fn get_scheduler(&self, scheduler_id: &str) -> Result<Option<SchedulerJson>> {
        let mut conn = self.conn.clone();
        let reply: Option<(HashMap<String, String>, String)> = self
            .scripts
            .get
            .key(self.keys.scheduler(scheduler_id))
            .key(self.keys.repeat_index())
            .arg(scheduler_id)
            .invoke_async(&mut conn)
            .await?;

        let Some((fields, raw_score)) = reply else {
            return Ok(None);
        };
        let next = parse_score(&raw_score);
        if fields.is_empty() {
            Ok(Some(legacy_descriptor(scheduler_id, next)))
        } else {
            Ok(Some(descriptor_from_hash(scheduler_id, fields, next)))
        }
    }

    /// Page through schedulers ordered by next fire time.
    ///
    /// The index range is a snapshot; the per-id definition reads are a
    /// pipelined fan-out and may observe newer definitions than the snapshot.
    /// `next` always reflects the snapshot score.
    pub async fn get_job_schedulers(
        &self,
        start: isize,
        end: isize,
        ascending: bool,
    ) -> Result<Vec<SchedulerJson>> {
        let mut conn = self.conn.clone();
        let index = self.keys.repeat_index();
        let entries: Vec<(String, f64)> = if ascending {
            conn.zrange_withscores(&index, start, end).await?
        } else {
            conn.zrevrange_withscores(&index, start, end).await?
        };
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (id, _) in &entries {
            pipe.hgetall(self.keys.scheduler(id));
        }
        let defs: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut out = Vec::with_capacity(entries.len());
        for ((id, score), fields) in entries.into_iter().zip(defs) {
            let next = Some(score as i64);
            if fields.is_empty() {
                out.push(legacy_descriptor(&id, next));
            } else {
                out.push(descriptor_from_hash(&id, fields, next));
            }
        }
        Ok(out)
    }

    /// Number of live schedulers in this queue.
    pub async fn get_schedulers_count(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(self.keys.repeat_index()).await?)
    }
}

/// Steps 1-5 of the upsert: validation, horizons, timing and instance
/// construction. Pure apart from the clock; no store contact.
fn plan_upsert(
    clock: &dyn Clock,
    pattern_strategy: &RepeatStrategy,
    scheduler_id: &str,
    repeat: &RepeatOptions,
    job_name: &str,
    template: &JobOptions,
) -> Result<Option<UpsertPlan>> {
    validate_repeat(repeat)?;

    let iteration_count = repeat.count.unwrap_or(0) + 1;
    if repeat.limit.is_some_and(|limit| iteration_count > limit) {
        return Ok(None);
    }

    let wall_now = clock.now_ms();
    if repeat.end_date.is_some_and(|end| wall_now > end) {
        return Ok(None);
    }

    // Never fire before the start date, and never before the previous fire.
    let mut now = wall_now;
    if let Some(start) = repeat.start_date {
        if start > now {
            now = start;
        }
    }
    let prev_millis = template.prev_millis.unwrap_or(0);
    now = now.max(prev_millis);

    let (next_millis, published_offset) = if let Some(every) = repeat.every {
        let fire = interval_next_millis(now, every, prev_millis, repeat.offset);
        (fire.next_millis, fire.published_offset)
    } else {
        match (pattern_strategy.as_ref())(now, repeat, Some(job_name)) {
            Some(ms) => (ms, None),
            // Dead schedule: no future occurrence. The definition is left
            // alone and nothing is enqueued.
            None => return Ok(None),
        }
    };

    let instance = build_next_instance(
        scheduler_id,
        next_millis,
        template,
        repeat,
        iteration_count,
        published_offset,
        wall_now,
    )?;

    Ok(Some(UpsertPlan {
        next_millis,
        instance,
    }))
}

fn validate_repeat(repeat: &RepeatOptions) -> Result<()> {
    match (repeat.every, repeat.pattern.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(SchedulerError::Validation(
                "both .every and .pattern are set; exactly one is allowed".into(),
            ))
        }
        (None, None) => {
            return Err(SchedulerError::Validation(
                "one of .every or .pattern is required".into(),
            ))
        }
        (Some(every), None) => {
            if every <= 0 {
                return Err(SchedulerError::Validation(
                    ".every must be a positive number of milliseconds".into(),
                ));
            }
            if repeat.immediately {
                warn!(".immediately has no effect with .every; the first instance always fires at once");
            }
        }
        (None, Some(_)) => {}
    }

    if repeat.immediately && repeat.start_date.is_some() {
        return Err(SchedulerError::Validation(
            ".immediately and .startDate are mutually exclusive".into(),
        ));
    }
    Ok(())
}

fn wrap_upsert_error(scheduler_id: &str, err: redis::RedisError) -> SchedulerError {
    // Connection-level failures propagate unchanged; everything else becomes
    // the composite transaction error.
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        SchedulerError::Redis(err)
    } else {
        SchedulerError::Upsert {
            scheduler_id: scheduler_id.to_string(),
            reason: err.to_string(),
        }
    }
}

fn parse_score(raw: &str) -> Option<i64> {
    raw.parse::<f64>().ok().map(|score| score as i64)
}

fn descriptor_from_hash(
    scheduler_id: &str,
    mut fields: HashMap<String, String>,
    next: Option<i64>,
) -> SchedulerJson {
    let data = fields
        .remove("data")
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let opts = fields
        .remove("opts")
        .and_then(|raw| JobOptions::from_json(&raw).ok());
    let template = if data.is_some() || opts.is_some() {
        Some(SchedulerTemplate { data, opts })
    } else {
        None
    };

    SchedulerJson {
        key: scheduler_id.to_string(),
        name: fields.remove("name").unwrap_or_default(),
        end_date: fields.remove("endDate").and_then(|v| v.parse().ok()),
        tz: fields.remove("tz"),
        pattern: fields.remove("pattern"),
        every: fields.remove("every").and_then(|v| v.parse().ok()),
        next,
        template,
    }
}

/// Synthesize a descriptor from the legacy `name:id:endDate:tz:pattern…`
/// member format. The pattern is the final segment and may itself contain
/// colons, so the split is bounded.
fn legacy_descriptor(key: &str, next: Option<i64>) -> SchedulerJson {
    let mut parts = key.splitn(5, ':');
    let name = parts.next().unwrap_or_default().to_string();
    let _legacy_id = parts.next();
    let end_date = parts.next().and_then(|v| v.parse().ok());
    let tz = parts.next().filter(|v| !v.is_empty()).map(str::to_string);
    let pattern = parts.next().filter(|v| !v.is_empty()).map(str::to_string);

    SchedulerJson {
        key: key.to_string(),
        name,
        end_date,
        tz,
        pattern,
        every: None,
        next,
        template: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberq_core::ManualClock;

    fn default_strategy() -> RepeatStrategy {
        Arc::new(default_pattern_strategy)
    }

    fn plan(
        now_ms: i64,
        repeat: &RepeatOptions,
        template: &JobOptions,
    ) -> Result<Option<UpsertPlan>> {
        let clock = ManualClock::new(now_ms);
        plan_upsert(&clock, &default_strategy(), "s1", repeat, "tick", template)
    }

    #[test]
    fn rejects_every_and_pattern_together() {
        let repeat = RepeatOptions {
            every: Some(1000),
            pattern: Some("* * * * *".into()),
            ..Default::default()
        };
        let err = plan(1000, &repeat, &JobOptions::default()).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
        assert!(err.to_string().contains(".every"));
        assert!(err.to_string().contains(".pattern"));
    }

    #[test]
    fn rejects_missing_timing_fields() {
        let err = plan(1000, &RepeatOptions::default(), &JobOptions::default()).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn rejects_non_positive_every() {
        let repeat = RepeatOptions {
            every: Some(0),
            ..Default::default()
        };
        assert!(plan(1000, &repeat, &JobOptions::default()).is_err());
    }

    #[test]
    fn rejects_immediately_with_start_date() {
        let repeat = RepeatOptions {
            pattern: Some("* * * * *".into()),
            immediately: true,
            start_date: Some(5000),
            ..Default::default()
        };
        let err = plan(1000, &repeat, &JobOptions::default()).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn first_interval_fire_plans_an_immediate_instance() {
        let repeat = RepeatOptions {
            every: Some(1000),
            ..Default::default()
        };
        let plan = plan(1000, &repeat, &JobOptions::default()).unwrap().unwrap();
        assert_eq!(plan.next_millis, 1000);
        assert_eq!(plan.instance.job_id, "repeat:s1:1000");
        assert_eq!(plan.instance.delay, 0);

        let carried = plan.instance.opts.repeat.unwrap();
        assert_eq!(carried.offset, Some(1000));
        assert_eq!(carried.count, Some(1));
    }

    #[test]
    fn subsequent_interval_fire_advances_one_slot() {
        let repeat = RepeatOptions {
            every: Some(1000),
            offset: Some(1000),
            count: Some(1),
            ..Default::default()
        };
        let template = JobOptions {
            prev_millis: Some(1000),
            ..Default::default()
        };
        let plan = plan(1500, &repeat, &template).unwrap().unwrap();
        assert_eq!(plan.next_millis, 3000);
        assert_eq!(plan.instance.job_id, "repeat:s1:3000");
        assert_eq!(plan.instance.delay, 1500);
        assert_eq!(plan.instance.opts.repeat.unwrap().count, Some(2));
    }

    #[test]
    fn limit_reached_is_a_no_op() {
        let repeat = RepeatOptions {
            every: Some(1000),
            limit: Some(2),
            count: Some(2),
            ..Default::default()
        };
        let template = JobOptions {
            prev_millis: Some(2000),
            ..Default::default()
        };
        assert!(plan(2500, &repeat, &template).unwrap().is_none());
    }

    #[test]
    fn passed_end_date_is_a_no_op() {
        let repeat = RepeatOptions {
            every: Some(1000),
            end_date: Some(900),
            ..Default::default()
        };
        assert!(plan(1000, &repeat, &JobOptions::default()).unwrap().is_none());
    }

    #[test]
    fn unset_end_date_does_not_suppress_fires() {
        let repeat = RepeatOptions {
            every: Some(1000),
            ..Default::default()
        };
        assert!(plan(i64::MAX / 2, &repeat, &JobOptions::default())
            .unwrap()
            .is_some());
    }

    #[test]
    fn future_start_date_aligns_the_first_fire() {
        let repeat = RepeatOptions {
            every: Some(1000),
            start_date: Some(5000),
            ..Default::default()
        };
        let plan = plan(1000, &repeat, &JobOptions::default()).unwrap().unwrap();
        assert_eq!(plan.next_millis, 5000);
        // delay is measured against the wall clock, not the aligned time
        assert_eq!(plan.instance.delay, 4000);
    }

    #[test]
    fn prev_millis_beyond_now_keeps_fires_monotonic() {
        let repeat = RepeatOptions {
            every: Some(1000),
            offset: Some(0),
            ..Default::default()
        };
        let template = JobOptions {
            prev_millis: Some(5000),
            ..Default::default()
        };
        let plan = plan(1000, &repeat, &template).unwrap().unwrap();
        assert_eq!(plan.next_millis, 6000);
    }

    #[test]
    fn dead_pattern_is_a_no_op() {
        let repeat = RepeatOptions {
            pattern: Some("definitely not cron".into()),
            ..Default::default()
        };
        assert!(plan(1000, &repeat, &JobOptions::default()).unwrap().is_none());
    }

    #[test]
    fn custom_strategy_overrides_the_pattern_evaluator() {
        let clock = ManualClock::new(1000);
        let strategy: RepeatStrategy =
            Arc::new(|now: i64, _opts: &RepeatOptions, _name: Option<&str>| Some(now + 42));
        let repeat = RepeatOptions {
            pattern: Some("whatever my calendar wants".into()),
            ..Default::default()
        };
        let plan = plan_upsert(&clock, &strategy, "s1", &repeat, "tick", &JobOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(plan.next_millis, 1042);
        assert_eq!(plan.instance.job_id, "repeat:s1:1042");
    }

    // --- descriptor decoding ------------------------------------------------

    #[test]
    fn descriptor_decodes_stored_fields() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "tick".to_string());
        fields.insert("endDate".to_string(), "9000".to_string());
        fields.insert("every".to_string(), "1000".to_string());
        fields.insert("data".to_string(), r#"{"x":1}"#.to_string());
        fields.insert("opts".to_string(), r#"{"priority":2}"#.to_string());

        let json = descriptor_from_hash("s1", fields, Some(3000));
        assert_eq!(json.key, "s1");
        assert_eq!(json.name, "tick");
        assert_eq!(json.end_date, Some(9000));
        assert_eq!(json.every, Some(1000));
        assert_eq!(json.next, Some(3000));
        let template = json.template.unwrap();
        assert_eq!(template.data.unwrap()["x"], 1);
        assert_eq!(template.opts.unwrap().priority, Some(2));
    }

    #[test]
    fn legacy_key_synthesizes_a_descriptor() {
        let json = legacy_descriptor("tick:s1:9000:Europe/Berlin:0 * * * *", Some(3000));
        assert_eq!(json.name, "tick");
        assert_eq!(json.end_date, Some(9000));
        assert_eq!(json.tz.as_deref(), Some("Europe/Berlin"));
        assert_eq!(json.pattern.as_deref(), Some("0 * * * *"));
        assert_eq!(json.every, None);
        assert_eq!(json.next, Some(3000));
    }

    #[test]
    fn legacy_key_with_missing_segments_degrades_gracefully() {
        let json = legacy_descriptor("tick:s1", None);
        assert_eq!(json.name, "tick");
        assert_eq!(json.end_date, None);
        assert_eq!(json.tz, None);
        assert_eq!(json.pattern, None);
    }
}
