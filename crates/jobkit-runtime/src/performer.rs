//! Execution entry point used by job engines.

use std::sync::Arc;

use jobkit_protocols::{Invocation, JobExecutor, JobId, JobParameters, PerformError};

use crate::pipeline::FilterPipeline;

/// Runs one attempt of an invocation: filter pipeline around handler dispatch.
///
/// Engines hold a performer and call [`JobPerformer::perform`] for every
/// attempt they execute; the performer never decides the next state.
#[derive(Clone)]
pub struct JobPerformer {
    pipeline: Arc<FilterPipeline>,
    executor: Arc<dyn JobExecutor>,
}

impl JobPerformer {
    pub fn new(pipeline: Arc<FilterPipeline>, executor: Arc<dyn JobExecutor>) -> Self {
        Self { pipeline, executor }
    }

    pub fn pipeline(&self) -> &Arc<FilterPipeline> {
        &self.pipeline
    }

    pub async fn perform(
        &self,
        job_id: &JobId,
        invocation: &Invocation,
        parameters: &JobParameters,
    ) -> Result<(), PerformError> {
        self.pipeline
            .perform(job_id, invocation, parameters, self.executor.as_ref())
            .await
    }
}
