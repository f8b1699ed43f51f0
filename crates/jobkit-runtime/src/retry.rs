//! Retry decision state machine.
//!
//! [`decide`] turns a failed attempt into the next state transition. It is
//! pure: the caller supplies the failure kind, the number of retries already
//! performed and the job's policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobkit_protocols::error::kinds;
use jobkit_protocols::{AttemptsExceededAction, FailureInfo, JobPolicy, JobState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EXCEPT_ON_REASON: &str = "Exception type is in ExceptOn list";
pub const ATTEMPTS_EXCEEDED_REASON: &str = "Retry attempts exceeded";
pub const HANDLER_NOT_REGISTERED_REASON: &str = "Job handler is not registered";
pub const INVALID_PAYLOAD_REASON: &str = "Job payload could not be decoded";

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryDecision {
    /// Schedule another attempt after `delay`.
    Retry {
        delay: Duration,
        next_attempt: u32,
        reason: String,
    },
    /// Leave the job failed.
    Fail { reason: String },
    /// Delete the job.
    Delete { reason: String },
}

impl RetryDecision {
    pub fn reason(&self) -> &str {
        match self {
            RetryDecision::Retry { reason, .. }
            | RetryDecision::Fail { reason }
            | RetryDecision::Delete { reason } => reason,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }

    /// The job state this decision elects for `failure`.
    pub fn into_state(self, failure: FailureInfo, now: DateTime<Utc>) -> JobState {
        match self {
            RetryDecision::Retry { delay, reason, .. } => {
                JobState::scheduled(delay, now, Some(reason))
            }
            RetryDecision::Fail { reason } => JobState::failed(failure, Some(reason)),
            RetryDecision::Delete { reason } => JobState::deleted(reason),
        }
    }
}

/// Decide what happens after a failed attempt.
///
/// `attempt_count` is the number of retries already performed (0 after the
/// first failure). Excluded kinds fail without retrying; otherwise the job is
/// retried while `attempt_count < retry_attempts`.
pub fn decide(failure_kind: &str, attempt_count: u32, policy: &JobPolicy) -> RetryDecision {
    if policy.is_excluded(failure_kind) {
        return RetryDecision::Fail {
            reason: EXCEPT_ON_REASON.to_string(),
        };
    }

    if attempt_count < policy.retry_attempts {
        let next_attempt = attempt_count + 1;
        return RetryDecision::Retry {
            delay: policy.delay_for_attempt(attempt_count),
            next_attempt,
            reason: format!("Retry attempt {} of {}", next_attempt, policy.retry_attempts),
        };
    }

    let reason = ATTEMPTS_EXCEEDED_REASON.to_string();
    match policy.on_attempts_exceeded {
        AttemptsExceededAction::Delete => RetryDecision::Delete { reason },
        AttemptsExceededAction::Fail => RetryDecision::Fail { reason },
    }
}

/// Reason for failure kinds that no retry can fix, if `kind` is one.
pub fn never_retried(kind: &str) -> Option<&'static str> {
    match kind {
        kinds::HANDLER_NOT_REGISTERED => Some(HANDLER_NOT_REGISTERED_REASON),
        kinds::INVALID_PAYLOAD => Some(INVALID_PAYLOAD_REASON),
        _ => None,
    }
}

/// Persisted record of the election made for one failure.
///
/// Re-running election for the same failure id replays `state` instead of
/// counting another attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryElection {
    pub failure_id: Uuid,
    pub decision: RetryDecision,
    pub state: JobState,
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
