//! Execution timing filter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jobkit_protocols::{FilterError, JobFilter, PerformedContext, PerformingContext};
use parking_lot::Mutex;
use tracing::info;

pub const TIMING_ORDER: i32 = 10;

/// Start instant of the current attempt, kept in its scope.
struct Stopwatch(Instant);

/// Aggregate timings observed by a [`TimingFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub executions: u64,
    pub failures: u64,
    pub total: Duration,
    pub max: Duration,
}

/// Measures each attempt from its performing-hook to its performed-hook.
#[derive(Debug, Default)]
pub struct TimingFilter {
    stats: Mutex<TimingStats>,
}

impl TimingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TimingStats {
        *self.stats.lock()
    }
}

#[async_trait]
impl JobFilter for TimingFilter {
    fn name(&self) -> &str {
        "timing"
    }

    fn execution_order(&self) -> i32 {
        TIMING_ORDER
    }

    async fn on_performing(&self, ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        ctx.scope().insert(Stopwatch(Instant::now()));
        Ok(())
    }

    async fn on_performed(&self, ctx: &PerformedContext<'_>) -> Result<(), FilterError> {
        // Absent when an earlier performing-hook failed.
        let Some(stopwatch) = ctx.scope().get::<Stopwatch>() else {
            return Ok(());
        };
        let elapsed = stopwatch.0.elapsed();

        {
            let mut stats = self.stats.lock();
            stats.executions += 1;
            if !ctx.succeeded() {
                stats.failures += 1;
            }
            stats.total += elapsed;
            stats.max = stats.max.max(elapsed);
        }

        info!(
            job = %ctx.record.display_name,
            correlation_id = %ctx.record.correlation_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            success = ctx.succeeded(),
            "Job finished in {}ms",
            elapsed.as_millis()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryParameterStore;
    use jobkit_protocols::{
        ExecutionContext, ExecutionRecord, ExecutionScope, Invocation, JobId, JobKind,
        JobParameters, JobPolicy, ScopeProviders,
    };
    use std::sync::Arc;

    fn record(job_id: &JobId) -> ExecutionRecord {
        ExecutionRecord {
            job_id: job_id.clone(),
            attempt: 0,
            display_name: "Daily Report Job".to_string(),
            policy: Arc::new(JobPolicy::new("daily_report")),
            context: ExecutionContext::new(),
            scope: ExecutionScope::new(job_id.clone(), ScopeProviders::new()),
        }
    }

    #[tokio::test]
    async fn test_records_elapsed_time() {
        let filter = TimingFilter::new();
        let job_id = JobId::from("job-1");
        let invocation = Invocation::new("daily_report", JobKind::Recurring, "Daily Report Job");
        let parameters = JobParameters::new(job_id.clone(), Arc::new(MemoryParameterStore::new()));
        let record = record(&job_id);

        let performing = PerformingContext {
            job_id: &job_id,
            invocation: &invocation,
            parameters: &parameters,
            record: &record,
        };
        filter.on_performing(&performing).await.unwrap();
        assert!(record.scope.get::<Stopwatch>().is_some());

        let performed = PerformedContext {
            job_id: &job_id,
            invocation: &invocation,
            parameters: &parameters,
            record: &record,
            error: None,
        };
        filter.on_performed(&performed).await.unwrap();

        let stats = filter.stats();
        assert_eq!(stats.executions, 1);
        assert_eq!(stats.failures, 0);
        assert!(stats.max <= stats.total);
    }

    #[tokio::test]
    async fn test_skips_without_stopwatch() {
        let filter = TimingFilter::new();
        let job_id = JobId::from("job-1");
        let invocation = Invocation::new("daily_report", JobKind::Recurring, "Daily Report Job");
        let parameters = JobParameters::new(job_id.clone(), Arc::new(MemoryParameterStore::new()));
        let record = record(&job_id);

        let performed = PerformedContext {
            job_id: &job_id,
            invocation: &invocation,
            parameters: &parameters,
            record: &record,
            error: None,
        };
        filter.on_performed(&performed).await.unwrap();
        assert_eq!(filter.stats(), TimingStats::default());
    }
}
