//! Handler failures.

use std::error::Error as StdError;
use std::fmt;

use uuid::Uuid;

use crate::state::FailureInfo;

/// Well-known failure kinds produced by the middleware itself.
pub mod kinds {
    pub const HANDLER_NOT_REGISTERED: &str = "handler_not_registered";
    pub const INVALID_PAYLOAD: &str = "invalid_payload";
    pub const FILTER_FAILED: &str = "filter_failed";
    pub const IO: &str = "io";
    pub const SERIALIZATION: &str = "serialization";
}

/// Failure raised by a job handler.
///
/// `kind` is the stable identifier matched against a policy's `except_on`
/// list; it must not depend on the message text.
#[derive(Debug)]
pub struct JobError {
    kind: String,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl JobError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error under the given kind.
    pub fn from_error<E>(kind: impl Into<String>, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Snapshot of this failure with a fresh failure id.
    pub fn to_failure(&self) -> FailureInfo {
        FailureInfo {
            id: Uuid::new_v4(),
            kind: self.kind.clone(),
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for JobError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for JobError {
    fn from(error: std::io::Error) -> Self {
        Self::from_error(kinds::IO, error)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(error: serde_json::Error) -> Self {
        Self::from_error(kinds::SERIALIZATION, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        let err = JobError::new("smtp_unavailable", "connection refused");
        assert_eq!(err.kind(), "smtp_unavailable");
        assert_eq!(err.message(), "connection refused");
        assert!(err.to_string().contains("smtp_unavailable"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_job_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: JobError = io_err.into();
        assert_eq!(err.kind(), "io");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_job_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = JobError::from(json_err);
        assert_eq!(err.kind(), "serialization");
    }

    #[test]
    fn test_to_failure_ids_are_unique() {
        let err = JobError::new("timeout", "took too long");
        let first = err.to_failure();
        let second = err.to_failure();
        assert_eq!(first.kind, "timeout");
        assert_eq!(first.message, "took too long");
        assert_ne!(first.id, second.id);
    }
}
