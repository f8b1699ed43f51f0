//! End-to-end flows through the builder, the manager and the in-memory engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobkit_core::handler_fn;
use jobkit_protocols::parameters::{RETRY_COUNT, RETRY_ELECTION};
use jobkit_protocols::{
    AttemptsExceededAction, DelayedJob, ExecutionContext, FilterError, Job, JobError, JobFilter,
    JobId, JobPolicy, JobState, MisfireHandling, PerformedContext, PerformingContext,
    RecurringJob,
};
use jobkit_runtime::{
    JobKit, MemoryJobEngine, RecurringOptions, RetryElection, SubmitOptions, TimingFilter,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Upload {
    path: String,
    error: Option<String>,
}

impl Job for Upload {
    const JOB_TYPE: &'static str = "upload";
}

impl DelayedJob for Upload {}

#[derive(Debug, Serialize, Deserialize)]
struct Digest;

impl Job for Digest {
    const JOB_TYPE: &'static str = "digest";
}

impl RecurringJob for Digest {}

fn upload(error: Option<&str>) -> Upload {
    Upload {
        path: "/tmp/report.csv".to_string(),
        error: error.map(str::to_string),
    }
}

fn failing_upload_kit(policy: JobPolicy) -> JobKit<MemoryJobEngine> {
    JobKit::builder()
        .policy::<Upload>(policy)
        .delayed_handler::<Upload, _>(handler_fn(|job: Upload, _ctx| async move {
            match job.error {
                Some(kind) => Err(JobError::new(kind, format!("upload of {} failed", job.path))),
                None => Ok(()),
            }
        }))
        .build()
        .unwrap()
}

async fn scheduled_delays(engine: &MemoryJobEngine, job_id: &JobId) -> Vec<Duration> {
    engine
        .history(job_id)
        .await
        .into_iter()
        .filter_map(|state| match state {
            JobState::Scheduled { delay, .. } => Some(delay),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_retries_follow_delay_sequence_then_fail() {
    let kit = failing_upload_kit(
        JobPolicy::new("Upload")
            .with_retry_attempts(2)
            .with_retry_delays_secs(&[5, 15]),
    );
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    assert_eq!(engine.drain(&[], 10).await.unwrap(), 3);

    assert_eq!(
        scheduled_delays(engine, &job_id).await,
        vec![Duration::from_secs(5), Duration::from_secs(15)]
    );
    let state = engine.state(&job_id).await.unwrap();
    assert_eq!(state.name(), "Failed");
    assert_eq!(state.reason(), Some("Retry attempts exceeded"));
}

#[tokio::test]
async fn test_delays_clamp_to_last_entry() {
    let kit = failing_upload_kit(
        JobPolicy::new("Upload")
            .with_retry_attempts(4)
            .with_retry_delays_secs(&[2, 8]),
    );
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    engine.drain(&[], 20).await.unwrap();

    assert_eq!(
        scheduled_delays(engine, &job_id).await,
        [2, 8, 8, 8].map(Duration::from_secs).to_vec()
    );
    let count: Option<u32> = engine.parameters(&job_id).get(RETRY_COUNT).await.unwrap();
    assert_eq!(count, Some(4));
}

#[tokio::test]
async fn test_subsecond_delay_matches_policy_after_persisting() {
    let policy = JobPolicy::new("Upload")
        .with_retry_attempts(1)
        .with_retry_delays(vec![Duration::from_millis(1500)]);
    let expected = policy.delay_for_attempt(0);
    let kit = failing_upload_kit(policy);
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    engine.drain(&[], 10).await.unwrap();

    assert_eq!(expected, Duration::from_secs(2));
    assert_eq!(scheduled_delays(engine, &job_id).await, vec![expected]);
}

#[tokio::test]
async fn test_excluded_kind_fails_immediately() {
    let kit = failing_upload_kit(
        JobPolicy::new("Upload")
            .with_retry_attempts(3)
            .except_on("validation"),
    );
    let engine = kit.engine();
    let job_id = kit
        .manager()
        .enqueue(&upload(Some("validation")), None)
        .await
        .unwrap();

    assert_eq!(engine.drain(&[], 10).await.unwrap(), 1);

    let state = engine.state(&job_id).await.unwrap();
    assert_eq!(state.name(), "Failed");
    assert_eq!(state.reason(), Some("Exception type is in ExceptOn list"));
    let count: Option<u32> = engine.parameters(&job_id).get(RETRY_COUNT).await.unwrap();
    assert_eq!(count.unwrap_or(0), 0);
}

#[tokio::test]
async fn test_exhausted_attempts_delete_when_configured() {
    let kit = failing_upload_kit(
        JobPolicy::new("Upload")
            .with_retry_attempts(1)
            .with_attempts_exceeded(AttemptsExceededAction::Delete),
    );
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    assert_eq!(engine.drain(&[], 10).await.unwrap(), 2);

    let state = engine.state(&job_id).await.unwrap();
    assert_eq!(state, JobState::deleted("Retry attempts exceeded"));
    assert_eq!(engine.pending_count().await, 0);
}

#[tokio::test]
async fn test_zero_attempts_fail_on_first_error() {
    let kit = failing_upload_kit(JobPolicy::new("Upload").with_retry_attempts(0));
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    assert_eq!(engine.drain(&[], 10).await.unwrap(), 1);
    assert_eq!(engine.state(&job_id).await.unwrap().name(), "Failed");
}

#[tokio::test]
async fn test_missing_handler_is_not_retried() {
    let kit = JobKit::builder()
        .policy::<Upload>(JobPolicy::new("Upload").with_retry_attempts(5))
        .build()
        .unwrap();
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(None), None).await.unwrap();

    assert_eq!(engine.drain(&[], 10).await.unwrap(), 1);

    let state = engine.state(&job_id).await.unwrap();
    assert_eq!(state.name(), "Failed");
    assert_eq!(
        state.failure().map(|f| f.kind.as_str()),
        Some("handler_not_registered")
    );
}

#[tokio::test]
async fn test_election_is_recorded_per_failure() {
    let kit = failing_upload_kit(JobPolicy::new("Upload").with_retry_attempts(1));
    let engine = kit.engine();
    let job_id = kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();

    let state = engine.perform(&job_id).await.unwrap();
    let election: RetryElection = engine
        .parameters(&job_id)
        .get(RETRY_ELECTION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(election.state, state);
    assert!(election.decision.is_retry());
}

/// Captures what the handler and the hooks observe for one attempt.
#[derive(Default)]
struct Observed {
    correlation_ids: Vec<String>,
    headers: Vec<Option<String>>,
    scope_ids: Vec<(uuid::Uuid, uuid::Uuid)>,
    order: Vec<String>,
}

struct Probe {
    name: &'static str,
    order: i32,
    observed: Arc<Mutex<Observed>>,
}

#[async_trait]
impl JobFilter for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn execution_order(&self) -> i32 {
        self.order
    }

    async fn on_performing(&self, ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        let mut observed = self.observed.lock();
        observed.order.push(format!("before:{}", self.order));
        if self.order == 1 {
            observed
                .correlation_ids
                .push(ctx.context().correlation_id().to_string());
            observed
                .headers
                .push(ctx.context().header("tenant").map(str::to_string));
        }
        ctx.scope().insert(ctx.scope().id());
        Ok(())
    }

    async fn on_performed(&self, ctx: &PerformedContext<'_>) -> Result<(), FilterError> {
        let mut observed = self.observed.lock();
        observed.order.push(format!("after:{}", self.order));
        if self.order == 1 {
            if let Some(seen) = ctx.scope().get::<uuid::Uuid>() {
                observed.scope_ids.push((*seen, ctx.scope().id()));
            }
        }
        Ok(())
    }
}

fn probed_kit(observed: &Arc<Mutex<Observed>>, handler_runs: Arc<AtomicUsize>) -> JobKit<MemoryJobEngine> {
    let mut builder = JobKit::builder().without_error_logging();
    for (name, order) in [("five", 5), ("minus_ten", -10), ("one", 1)] {
        builder = builder.filter(Arc::new(Probe {
            name,
            order,
            observed: observed.clone(),
        }));
    }
    builder
        .policy::<Upload>(JobPolicy::new("Upload").with_retry_attempts(1))
        .delayed_handler::<Upload, _>(handler_fn(move |job: Upload, _ctx| {
            let runs = handler_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                match job.error {
                    Some(kind) => Err(JobError::new(kind, "failed")),
                    None => Ok(()),
                }
            }
        }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_hook_order_around_handler() {
    let observed = Arc::new(Mutex::new(Observed::default()));
    let kit = probed_kit(&observed, Arc::new(AtomicUsize::new(0)));
    let job_id = kit.manager().enqueue(&upload(None), None).await.unwrap();
    kit.engine().perform(&job_id).await.unwrap();

    let order = observed.lock().order.clone();
    assert_eq!(
        order,
        vec!["before:-10", "before:1", "before:5", "after:5", "after:1", "after:-10"]
    );
}

#[tokio::test]
async fn test_context_survives_every_retry() {
    let observed = Arc::new(Mutex::new(Observed::default()));
    let kit = probed_kit(&observed, Arc::new(AtomicUsize::new(0)));
    let context = ExecutionContext::with_correlation_id("corr-upload").with_header("tenant", "acme");

    kit.manager()
        .submit(&upload(Some("io")), SubmitOptions::new().with_context(context))
        .await
        .unwrap();
    assert_eq!(kit.engine().drain(&[], 10).await.unwrap(), 2);

    let observed = observed.lock();
    assert_eq!(observed.correlation_ids, vec!["corr-upload", "corr-upload"]);
    assert_eq!(
        observed.headers,
        vec![Some("acme".to_string()), Some("acme".to_string())]
    );
}

#[tokio::test]
async fn test_scope_is_fresh_per_attempt() {
    let observed = Arc::new(Mutex::new(Observed::default()));
    let kit = probed_kit(&observed, Arc::new(AtomicUsize::new(0)));
    kit.manager().enqueue(&upload(Some("io")), None).await.unwrap();
    kit.engine().drain(&[], 10).await.unwrap();

    let scope_ids = observed.lock().scope_ids.clone();
    assert_eq!(scope_ids.len(), 2);
    for (seen_before, seen_after) in &scope_ids {
        assert_eq!(seen_before, seen_after);
    }
    assert_ne!(scope_ids[0].1, scope_ids[1].1);
}

#[tokio::test]
async fn test_queue_override_and_configured_queue() {
    let kit = JobKit::builder()
        .default_queue("general")
        .policy::<Upload>(JobPolicy::new("Upload").with_queue("uploads"))
        .build()
        .unwrap();
    let engine = kit.engine();

    let configured = kit.manager().enqueue(&upload(None), None).await.unwrap();
    let overridden = kit
        .manager()
        .submit(&upload(None), SubmitOptions::new().with_queue("urgent"))
        .await
        .unwrap();

    assert_eq!(engine.queue_of(&configured).await.as_deref(), Some("uploads"));
    assert_eq!(engine.queue_of(&overridden).await.as_deref(), Some("urgent"));
}

#[tokio::test]
async fn test_delayed_submission_waits() {
    let runs = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Observed::default()));
    let kit = probed_kit(&observed, runs.clone());
    let job_id = kit
        .manager()
        .schedule(&upload(None), Duration::from_secs(300), None)
        .await
        .unwrap();

    let engine = kit.engine();
    assert_eq!(engine.run_until_idle(&[], Utc::now()).await.unwrap(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let later = Utc::now() + chrono::Duration::seconds(301);
    assert_eq!(engine.run_until_idle(&[], later).await.unwrap(), 1);
    assert_eq!(engine.state(&job_id).await, Some(JobState::Succeeded));
}

#[tokio::test]
async fn test_recurring_job_runs_through_pipeline() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let timing = Arc::new(TimingFilter::new());
    let kit = JobKit::builder()
        .policy::<Digest>(JobPolicy::new("Daily Digest").with_queue("reports"))
        .recurring_handler::<Digest, _>(handler_fn(move |_job: Digest, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), JobError>(())
            }
        }))
        .filter(timing.clone())
        .build()
        .unwrap();
    let engine = kit.engine();

    kit.manager()
        .submit_recurring(
            "digest",
            &Digest,
            RecurringOptions::new("*/5 * * * *").with_misfire_handling(MisfireHandling::Strict),
        )
        .await
        .unwrap();
    assert_eq!(engine.recurring_cron("digest").await.as_deref(), Some("0 */5 * * * *"));

    let job_id = engine.trigger_recurring("digest").await.unwrap();
    assert_eq!(engine.queue_of(&job_id).await.as_deref(), Some("reports"));

    let queues = vec!["reports".to_string()];
    assert_eq!(engine.run_until_idle(&queues, Utc::now()).await.unwrap(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(timing.stats().executions, 1);

    assert!(kit.manager().remove_recurring("digest").await.unwrap());
    assert!(engine.recurring_ids().await.is_empty());
}

#[tokio::test]
async fn test_overlapping_workers_claim_each_job_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Observed::default()));
    let kit = probed_kit(&observed, runs.clone());
    for _ in 0..8 {
        kit.manager().enqueue(&upload(None), None).await.unwrap();
    }

    let engine = kit.engine().clone();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_until_idle(&[], Utc::now()).await.unwrap() })
        })
        .collect();
    let processed: usize = futures::future::join_all(workers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();

    assert_eq!(processed, 8);
    assert_eq!(runs.load(Ordering::SeqCst), 8);
    assert_eq!(engine.jobs_in_state("Succeeded").await.len(), 8);
}
