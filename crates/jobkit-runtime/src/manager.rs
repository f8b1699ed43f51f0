//! Job submission API.

use std::sync::Arc;
use std::time::Duration;

use jobkit_core::PolicyRegistry;
use jobkit_protocols::{
    DelayedJob, ExecutionContext, Invocation, Job, JobEngine, JobId, JobKind, MisfireHandling,
    RecurringJob, RecurringJobOptions,
};
use tracing::debug;

use crate::error::JobKitError;
use crate::schedule::{normalize_cron, parse_cron};

/// Options for submitting a one-shot job.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Context to propagate; a fresh one is created when absent.
    pub context: Option<ExecutionContext>,
    /// Queue override; empty or absent falls back to the job's policy.
    pub queue: Option<String>,
    /// Run after this delay instead of immediately.
    pub delay: Option<Duration>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Options for registering a recurring job.
#[derive(Debug, Clone)]
pub struct RecurringOptions {
    pub context: Option<ExecutionContext>,
    pub queue: Option<String>,
    /// Cron expression (5, 6 or 7 fields), evaluated in UTC.
    pub cron: String,
    pub misfire_handling: MisfireHandling,
}

impl RecurringOptions {
    pub fn new(cron: impl Into<String>) -> Self {
        Self {
            context: None,
            queue: None,
            cron: cron.into(),
            misfire_handling: MisfireHandling::Relaxed,
        }
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_misfire_handling(mut self, misfire_handling: MisfireHandling) -> Self {
        self.misfire_handling = misfire_handling;
        self
    }
}

/// Submits jobs to an engine with their policy and context attached.
#[derive(Clone)]
pub struct JobManager {
    engine: Arc<dyn JobEngine>,
    policies: Arc<PolicyRegistry>,
}

impl JobManager {
    pub fn new(engine: Arc<dyn JobEngine>, policies: Arc<PolicyRegistry>) -> Self {
        Self { engine, policies }
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    /// Queue for a job type: a non-empty override, else the policy's queue,
    /// else the registry's default queue.
    pub fn resolve_queue(&self, job_type: &str, requested: Option<&str>) -> String {
        if let Some(queue) = requested.map(str::trim).filter(|q| !q.is_empty()) {
            return queue.to_string();
        }
        let policy = self.policies.resolve(job_type);
        if policy.queue.trim().is_empty() {
            self.policies.default_queue().to_string()
        } else {
            policy.queue.clone()
        }
    }

    fn invocation<J: Job>(
        &self,
        job: &J,
        kind: JobKind,
        context: Option<ExecutionContext>,
    ) -> Result<Invocation, JobKitError> {
        let display_name = self.policies.display_name(J::JOB_TYPE);
        let context = context.unwrap_or_default();
        Ok(Invocation::for_job(job, kind, display_name, context)?)
    }

    /// Submit a one-shot job: enqueued now, or scheduled when a delay is given.
    pub async fn submit<J: DelayedJob>(
        &self,
        job: &J,
        options: SubmitOptions,
    ) -> Result<JobId, JobKitError> {
        let queue = self.resolve_queue(J::JOB_TYPE, options.queue.as_deref());
        let invocation = self.invocation(job, JobKind::OneShot, options.context)?;
        let correlation_id = invocation
            .context()
            .map(|ctx| ctx.correlation_id().to_string())
            .unwrap_or_default();

        let job_id = match options.delay {
            Some(delay) => self.engine.schedule(&queue, invocation, delay).await?,
            None => self.engine.enqueue(&queue, invocation).await?,
        };
        debug!(
            job_id = %job_id,
            job_type = J::JOB_TYPE,
            queue = %queue,
            correlation_id = %correlation_id,
            delay_secs = options.delay.map(|d| d.as_secs()),
            "Job submitted"
        );
        Ok(job_id)
    }

    /// Enqueue a one-shot job for immediate execution.
    pub async fn enqueue<J: DelayedJob>(
        &self,
        job: &J,
        context: Option<ExecutionContext>,
    ) -> Result<JobId, JobKitError> {
        let mut options = SubmitOptions::new();
        options.context = context;
        self.submit(job, options).await
    }

    /// Schedule a one-shot job to run after `delay`.
    pub async fn schedule<J: DelayedJob>(
        &self,
        job: &J,
        delay: Duration,
        context: Option<ExecutionContext>,
    ) -> Result<JobId, JobKitError> {
        let mut options = SubmitOptions::new().with_delay(delay);
        options.context = context;
        self.submit(job, options).await
    }

    /// Create or replace the recurring registration `recurring_id`.
    pub async fn submit_recurring<J: RecurringJob>(
        &self,
        recurring_id: &str,
        job: &J,
        options: RecurringOptions,
    ) -> Result<(), JobKitError> {
        if recurring_id.trim().is_empty() {
            return Err(JobKitError::InvalidArgument(
                "recurring id must not be empty".to_string(),
            ));
        }
        parse_cron(&options.cron)?;
        let cron = normalize_cron(&options.cron);

        let queue = self.resolve_queue(J::JOB_TYPE, options.queue.as_deref());
        let invocation = self.invocation(job, JobKind::Recurring, options.context)?;
        let engine_options = RecurringJobOptions {
            misfire_handling: options.misfire_handling,
        };

        self.engine
            .add_or_update_recurring(recurring_id, &queue, invocation, &cron, engine_options)
            .await?;
        debug!(
            recurring_id,
            job_type = J::JOB_TYPE,
            queue = %queue,
            cron = %cron,
            "Recurring job registered"
        );
        Ok(())
    }

    /// Remove a recurring registration. Returns whether it existed.
    pub async fn remove_recurring(&self, recurring_id: &str) -> Result<bool, JobKitError> {
        Ok(self.engine.remove_recurring(recurring_id).await?)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
