//! Handler dispatch errors.

use thiserror::Error;

use super::job::{kinds, JobError};
use crate::job::JobKind;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No {kind} handler registered for job type: {job_type}")]
    HandlerNotRegistered { job_type: String, kind: JobKind },

    #[error("Invalid payload for job type {job_type}: {message}")]
    InvalidPayload { job_type: String, message: String },

    #[error("Handler failed: {0}")]
    Handler(#[from] JobError),
}

impl DispatchError {
    /// Failure kind used for retry decisions.
    pub fn kind(&self) -> &str {
        match self {
            DispatchError::HandlerNotRegistered { .. } => kinds::HANDLER_NOT_REGISTERED,
            DispatchError::InvalidPayload { .. } => kinds::INVALID_PAYLOAD,
            DispatchError::Handler(err) => err.kind(),
        }
    }

    /// Whether the failure is a wiring problem that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, DispatchError::Handler(_))
    }
}
