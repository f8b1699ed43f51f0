//! Contexts passed to filter hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::engine::JobParameters;
use crate::error::PerformError;
use crate::invocation::Invocation;
use crate::job::JobId;
use crate::policy::JobPolicy;
use crate::scope::ExecutionScope;
use crate::state::JobState;

/// Before the engine persists an invocation.
///
/// Parameters set here are persisted together with the invocation.
#[derive(Debug, Clone)]
pub struct CreatingContext {
    pub invocation: Invocation,
    pub queue: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl CreatingContext {
    pub fn new(invocation: Invocation, queue: impl Into<String>) -> Self {
        Self {
            invocation,
            queue: queue.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn set_parameter<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.parameters
            .insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get_parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }
}

/// After the engine persisted an invocation.
#[derive(Debug)]
pub struct CreatedContext<'a> {
    pub job_id: &'a JobId,
    pub invocation: &'a Invocation,
    pub queue: &'a str,
    pub parameters: &'a JobParameters,
}

/// Per-attempt record, alive from the opening of the scope to its release.
#[derive(Debug)]
pub struct ExecutionRecord {
    pub job_id: JobId,
    /// Number of retries before this attempt; 0 on the first run.
    pub attempt: u32,
    pub display_name: String,
    pub policy: Arc<JobPolicy>,
    pub context: ExecutionContext,
    pub scope: ExecutionScope,
}

impl ExecutionRecord {
    pub fn correlation_id(&self) -> &str {
        self.context.correlation_id()
    }
}

/// Before the handler runs.
#[derive(Debug)]
pub struct PerformingContext<'a> {
    pub job_id: &'a JobId,
    pub invocation: &'a Invocation,
    pub parameters: &'a JobParameters,
    pub record: &'a ExecutionRecord,
}

impl PerformingContext<'_> {
    pub fn scope(&self) -> &ExecutionScope {
        &self.record.scope
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.record.context
    }
}

/// After the handler ran, or after a before-hook failed.
#[derive(Debug)]
pub struct PerformedContext<'a> {
    pub job_id: &'a JobId,
    pub invocation: &'a Invocation,
    pub parameters: &'a JobParameters,
    pub record: &'a ExecutionRecord,
    pub error: Option<&'a PerformError>,
}

impl PerformedContext<'_> {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn scope(&self) -> &ExecutionScope {
        &self.record.scope
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.record.context
    }
}

/// While the engine elects the next state; hooks may replace the candidate.
#[derive(Debug)]
pub struct ElectStateContext<'a> {
    pub job_id: &'a JobId,
    pub invocation: &'a Invocation,
    pub parameters: &'a JobParameters,
    pub current_state: Option<&'a JobState>,
    pub candidate_state: JobState,
}

/// After a state was applied to, or removed from, a job.
#[derive(Debug)]
pub struct ApplyStateContext<'a> {
    pub job_id: &'a JobId,
    pub invocation: &'a Invocation,
    pub parameters: &'a JobParameters,
    pub old_state: Option<&'a JobState>,
    pub new_state: &'a JobState,
}
