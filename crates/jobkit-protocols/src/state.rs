//! Job states elected by the engine after each transition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Unique per failed attempt.
    pub id: Uuid,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Enqueued {
        queue: String,
    },
    Scheduled {
        delay: Duration,
        enqueue_at: DateTime<Utc>,
        reason: Option<String>,
    },
    Processing,
    Succeeded,
    Failed {
        failure: FailureInfo,
        reason: Option<String>,
    },
    Deleted {
        reason: Option<String>,
    },
}

impl JobState {
    pub fn enqueued(queue: impl Into<String>) -> Self {
        Self::Enqueued {
            queue: queue.into(),
        }
    }

    /// Scheduled to be enqueued `delay` after `now`.
    pub fn scheduled(delay: Duration, now: DateTime<Utc>, reason: Option<String>) -> Self {
        let enqueue_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::Scheduled {
            delay,
            enqueue_at,
            reason,
        }
    }

    pub fn failed(failure: FailureInfo, reason: Option<String>) -> Self {
        Self::Failed { failure, reason }
    }

    pub fn deleted(reason: impl Into<String>) -> Self {
        Self::Deleted {
            reason: Some(reason.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Enqueued { .. } => "Enqueued",
            JobState::Scheduled { .. } => "Scheduled",
            JobState::Processing => "Processing",
            JobState::Succeeded => "Succeeded",
            JobState::Failed { .. } => "Failed",
            JobState::Deleted { .. } => "Deleted",
        }
    }

    /// Whether the job leaves the engine's active set in this state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed { .. } | JobState::Deleted { .. }
        )
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            JobState::Scheduled { reason, .. }
            | JobState::Failed { reason, .. }
            | JobState::Deleted { reason } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match self {
            JobState::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
