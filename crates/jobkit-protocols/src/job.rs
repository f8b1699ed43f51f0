//! Job definitions.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution variant of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Executed once, immediately or after a delay.
    OneShot,
    /// Executed on a schedule identified by a stable recurring id.
    Recurring,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::OneShot => "one-shot",
            JobKind::Recurring => "recurring",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serializable unit of work.
///
/// `JOB_TYPE` is the stable type identity used to look up policies and
/// handlers. It must not change between deployments that share queued work.
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable job type identifier.
    const JOB_TYPE: &'static str;
}

/// Marker for jobs executed once, either immediately or after a delay.
pub trait DelayedJob: Job {}

/// Marker for jobs executed on a recurring schedule.
pub trait RecurringJob: Job {}

/// Identifier assigned by the job engine to one persisted invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::OneShot.to_string(), "one-shot");
        assert_eq!(JobKind::Recurring.to_string(), "recurring");
    }

    #[test]
    fn test_job_kind_serde() {
        let json = serde_json::to_string(&JobKind::Recurring).unwrap();
        assert_eq!(json, "\"recurring\"");
        let kind: JobKind = serde_json::from_str("\"one_shot\"").unwrap();
        assert_eq!(kind, JobKind::OneShot);
    }

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_job_id_transparent_serde() {
        let id = JobId::from("job-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"job-42\"");
        assert_eq!(id.to_string(), "job-42");
    }
}
