//! Job engine and parameter store errors.

use thiserror::Error;

use crate::job::JobId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Recurring job not found: {0}")]
    RecurringNotFound(String),

    #[error("Job {job_id} is in state {state}, expected {expected}")]
    InvalidState {
        job_id: JobId,
        state: String,
        expected: String,
    },

    #[error("Invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine rejected the job: {0}")]
    Rejected(String),
}
