//! Structured logging of job execution events.

use async_trait::async_trait;
use jobkit_protocols::parameters::LOG_EVENTS;
use jobkit_protocols::{
    FilterError, JobFilter, JobParameters, PerformedContext, PerformingContext,
};
use tracing::{error, info};

pub const ERROR_LOGGING_ORDER: i32 = 1;

/// Logs every failed execution, and start and completion events for jobs
/// whose policy enables `log_events`.
///
/// Logging never replaces error propagation: the failure still reaches state
/// election unchanged.
#[derive(Debug, Default)]
pub struct ErrorLoggingFilter;

impl ErrorLoggingFilter {
    pub fn new() -> Self {
        Self
    }

    /// The persisted `LogEvents` flag, else the resolved policy's.
    async fn log_events(parameters: &JobParameters, fallback: bool) -> bool {
        parameters
            .get::<bool>(LOG_EVENTS)
            .await
            .ok()
            .flatten()
            .unwrap_or(fallback)
    }
}

#[async_trait]
impl JobFilter for ErrorLoggingFilter {
    fn name(&self) -> &str {
        "error_logging"
    }

    fn execution_order(&self) -> i32 {
        ERROR_LOGGING_ORDER
    }

    async fn on_performing(&self, ctx: &PerformingContext<'_>) -> Result<(), FilterError> {
        if Self::log_events(ctx.parameters, ctx.record.policy.log_events).await {
            info!(
                job_id = %ctx.job_id,
                job = %ctx.record.display_name,
                correlation_id = %ctx.record.correlation_id(),
                attempt = ctx.record.attempt,
                "Job started"
            );
        }
        Ok(())
    }

    async fn on_performed(&self, ctx: &PerformedContext<'_>) -> Result<(), FilterError> {
        match ctx.error {
            Some(e) => {
                error!(
                    job_id = %ctx.job_id,
                    job = %ctx.record.display_name,
                    correlation_id = %ctx.record.correlation_id(),
                    attempt = ctx.record.attempt,
                    kind = e.failure_kind(),
                    args = %ctx.invocation.display_args(),
                    "Job failed: {}",
                    e
                );
            }
            None => {
                if Self::log_events(ctx.parameters, ctx.record.policy.log_events).await {
                    info!(
                        job_id = %ctx.job_id,
                        job = %ctx.record.display_name,
                        correlation_id = %ctx.record.correlation_id(),
                        attempt = ctx.record.attempt,
                        "Job completed"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_after_retry_policy() {
        let filter = ErrorLoggingFilter::new();
        assert_eq!(filter.execution_order(), 1);
        assert!(filter.execution_order() > crate::filters::RETRY_POLICY_ORDER);
        assert_eq!(filter.name(), "error_logging");
    }
}
