//! Outcome of one pipeline execution.

use thiserror::Error;
use uuid::Uuid;

use super::dispatch::DispatchError;
use super::filter::FilterError;
use super::job::kinds;
use crate::state::FailureInfo;

/// The authoritative failure of one execution attempt.
#[derive(Debug, Error)]
pub enum PerformError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl PerformError {
    /// Kind string consumed by the retry state machine.
    pub fn failure_kind(&self) -> &str {
        match self {
            PerformError::Dispatch(err) => err.kind(),
            PerformError::Filter(_) => kinds::FILTER_FAILED,
        }
    }

    pub fn message(&self) -> String {
        match self {
            PerformError::Dispatch(DispatchError::Handler(err)) => err.message().to_string(),
            other => other.to_string(),
        }
    }

    /// Snapshot of this failure with a fresh failure id.
    pub fn to_failure(&self) -> FailureInfo {
        FailureInfo {
            id: Uuid::new_v4(),
            kind: self.failure_kind().to_string(),
            message: self.message(),
        }
    }
}
