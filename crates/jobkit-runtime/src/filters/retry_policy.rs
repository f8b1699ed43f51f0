//! Bridges job policies into engine parameters and retry state election.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jobkit_core::PolicyRegistry;
use jobkit_protocols::parameters::{
    DISPLAY_NAME, EXCEPT_ON, LOG_EVENTS, ON_ATTEMPTS_EXCEEDED, RETRY_ATTEMPTS, RETRY_COUNT,
    RETRY_DELAYS, RETRY_ELECTION,
};
use jobkit_protocols::{
    AttemptsExceededAction, CreatingContext, ElectStateContext, FilterError, JobFilter,
    JobParameters, JobPolicy, JobState, StoreError,
};
use tracing::{info, warn};

use crate::retry::{decide, never_retried, RetryDecision, RetryElection};

/// Runs before every other filter.
pub const RETRY_POLICY_ORDER: i32 = -1000;

/// Persists each job's policy at creation and elects the next state after a
/// failed attempt.
///
/// Election reads the policy persisted with the job, so a job keeps the
/// policy it was created under. Parameters missing from older jobs fall back
/// to the registry.
pub struct RetryPolicyFilter {
    policies: Arc<PolicyRegistry>,
}

impl RetryPolicyFilter {
    pub fn new(policies: Arc<PolicyRegistry>) -> Self {
        Self { policies }
    }

    async fn persisted_policy(
        &self,
        job_type: &str,
        parameters: &JobParameters,
    ) -> Result<JobPolicy, StoreError> {
        let fallback = self.policies.resolve(job_type);

        let display_name = parameters
            .get::<String>(DISPLAY_NAME)
            .await?
            .unwrap_or_else(|| fallback.display_name.clone());
        let retry_attempts = parameters
            .get::<u32>(RETRY_ATTEMPTS)
            .await?
            .unwrap_or(fallback.retry_attempts);
        let retry_delays = parameters
            .get::<Vec<u64>>(RETRY_DELAYS)
            .await?
            .unwrap_or_else(|| fallback.retry_delays_secs());
        let on_attempts_exceeded = parameters
            .get::<AttemptsExceededAction>(ON_ATTEMPTS_EXCEEDED)
            .await?
            .unwrap_or(fallback.on_attempts_exceeded);
        let except_on = parameters
            .get::<Vec<String>>(EXCEPT_ON)
            .await?
            .unwrap_or_else(|| fallback.except_on.iter().cloned().collect());
        let log_events = parameters
            .get::<bool>(LOG_EVENTS)
            .await?
            .unwrap_or(fallback.log_events);

        Ok(except_on.into_iter().fold(
            JobPolicy::new(display_name)
                .with_retry_attempts(retry_attempts)
                .with_retry_delays_secs(&retry_delays)
                .with_attempts_exceeded(on_attempts_exceeded)
                .with_queue(fallback.queue.clone())
                .with_log_events(log_events),
            |policy, kind| policy.except_on(kind),
        ))
    }
}

fn serialization_error(e: serde_json::Error) -> FilterError {
    FilterError::Store(StoreError::Serialization(e))
}

#[async_trait]
impl JobFilter for RetryPolicyFilter {
    fn name(&self) -> &str {
        "retry_policy"
    }

    fn execution_order(&self) -> i32 {
        RETRY_POLICY_ORDER
    }

    async fn on_creating(&self, ctx: &mut CreatingContext) -> Result<(), FilterError> {
        let policy = self.policies.resolve(&ctx.invocation.job_type);
        let except_on: Vec<&String> = policy.except_on.iter().collect();

        ctx.set_parameter(DISPLAY_NAME, &policy.display_name)
            .map_err(serialization_error)?;
        ctx.set_parameter(RETRY_ATTEMPTS, &policy.retry_attempts)
            .map_err(serialization_error)?;
        ctx.set_parameter(RETRY_DELAYS, &policy.retry_delays_secs())
            .map_err(serialization_error)?;
        ctx.set_parameter(ON_ATTEMPTS_EXCEEDED, &policy.on_attempts_exceeded)
            .map_err(serialization_error)?;
        ctx.set_parameter(EXCEPT_ON, &except_on)
            .map_err(serialization_error)?;
        ctx.set_parameter(LOG_EVENTS, &policy.log_events)
            .map_err(serialization_error)?;
        Ok(())
    }

    async fn on_state_election(&self, ctx: &mut ElectStateContext<'_>) -> Result<(), FilterError> {
        let failure = match ctx.candidate_state.failure() {
            Some(failure) => failure.clone(),
            None => return Ok(()),
        };

        if let Some(election) = ctx.parameters.get::<RetryElection>(RETRY_ELECTION).await? {
            if election.failure_id == failure.id {
                ctx.candidate_state = election.state;
                return Ok(());
            }
        }

        if let Some(reason) = never_retried(&failure.kind) {
            warn!(
                job_id = %ctx.job_id,
                job = %ctx.invocation.job_type,
                "{}: {}",
                reason,
                failure.message
            );
            ctx.candidate_state = JobState::failed(failure, Some(reason.to_string()));
            return Ok(());
        }

        let policy = self
            .persisted_policy(&ctx.invocation.job_type, ctx.parameters)
            .await?;
        let attempt = ctx
            .parameters
            .get::<u32>(RETRY_COUNT)
            .await?
            .unwrap_or(0);

        let decision = decide(&failure.kind, attempt, &policy);
        let state = decision.clone().into_state(failure.clone(), Utc::now());

        let mut entries = Vec::with_capacity(2);
        if let RetryDecision::Retry { next_attempt, .. } = &decision {
            entries.push((RETRY_COUNT.to_string(), serde_json::json!(next_attempt)));
        }
        let election = RetryElection {
            failure_id: failure.id,
            decision: decision.clone(),
            state: state.clone(),
        };
        entries.push((
            RETRY_ELECTION.to_string(),
            serde_json::to_value(&election).map_err(serialization_error)?,
        ));
        ctx.parameters.set_many(entries).await?;

        match &decision {
            RetryDecision::Retry { delay, .. } => info!(
                job_id = %ctx.job_id,
                job = %policy.display_name,
                "{}, next attempt in {}s ({})",
                decision.reason(),
                delay.as_secs(),
                failure.kind
            ),
            _ => warn!(
                job_id = %ctx.job_id,
                job = %policy.display_name,
                "{} ({}: {})",
                decision.reason(),
                failure.kind,
                failure.message
            ),
        }

        ctx.candidate_state = state;
        Ok(())
    }
}

#[cfg(test)]
#[path = "retry_policy_tests.rs"]
mod tests;
