//! Ordered filter pipeline.
//!
//! Filters are sorted once, ascending by `execution_order()`, with ties kept
//! in registration order. Performing-hooks run in that order; performed-hooks
//! run for every filter in the exact reverse order.

use std::sync::Arc;

use jobkit_core::PolicyRegistry;
use jobkit_protocols::parameters::{DISPLAY_NAME, RETRY_COUNT};
use jobkit_protocols::{
    ApplyStateContext, CreatedContext, CreatingContext, ElectStateContext, ExecutionContext,
    ExecutionRecord, Invocation, JobExecutor, JobFilter, JobId, JobParameters, PerformError,
    PerformedContext, PerformingContext, ScopeFactory,
};
use tracing::{debug, warn};

pub struct FilterPipeline {
    filters: Vec<Arc<dyn JobFilter>>,
    scope_factory: Arc<dyn ScopeFactory>,
    policies: Arc<PolicyRegistry>,
}

impl FilterPipeline {
    pub fn new(
        mut filters: Vec<Arc<dyn JobFilter>>,
        scope_factory: Arc<dyn ScopeFactory>,
        policies: Arc<PolicyRegistry>,
    ) -> Self {
        // Stable sort keeps registration order for equal orders.
        filters.sort_by_key(|filter| filter.execution_order());
        Self {
            filters,
            scope_factory,
            policies,
        }
    }

    /// Filters in execution order.
    pub fn filters(&self) -> &[Arc<dyn JobFilter>] {
        &self.filters
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    /// Execute one attempt of `invocation` inside a fresh scope.
    ///
    /// The first performing-hook error skips the remaining performing-hooks
    /// and the handler and becomes the attempt's failure. Performed-hook
    /// errors are logged and never change the outcome. The scope is released
    /// exactly once on every exit path, including cancellation.
    pub async fn perform(
        &self,
        job_id: &JobId,
        invocation: &Invocation,
        parameters: &JobParameters,
        executor: &dyn JobExecutor,
    ) -> Result<(), PerformError> {
        let record = self.open_record(job_id, invocation, parameters).await;
        let mut failure: Option<PerformError> = None;

        for filter in &self.filters {
            let ctx = PerformingContext {
                job_id,
                invocation,
                parameters,
                record: &record,
            };
            if let Err(e) = filter.on_performing(&ctx).await {
                warn!(
                    job_id = %job_id,
                    filter = filter.name(),
                    "Performing hook failed, skipping handler: {}",
                    e
                );
                failure = Some(e.into());
                break;
            }
        }

        if failure.is_none() {
            if let Err(e) = executor
                .execute(invocation, record.context.clone(), &record.scope)
                .await
            {
                failure = Some(e.into());
            }
        }

        for filter in self.filters.iter().rev() {
            let ctx = PerformedContext {
                job_id,
                invocation,
                parameters,
                record: &record,
                error: failure.as_ref(),
            };
            if let Err(e) = filter.on_performed(&ctx).await {
                warn!(
                    job_id = %job_id,
                    filter = filter.name(),
                    "Performed hook failed: {}",
                    e
                );
            }
        }

        record.scope.release();

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn open_record(
        &self,
        job_id: &JobId,
        invocation: &Invocation,
        parameters: &JobParameters,
    ) -> ExecutionRecord {
        let policy = self.policies.resolve(&invocation.job_type);

        let attempt = match parameters.get::<u32>(RETRY_COUNT).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!(job_id = %job_id, "Unreadable {} parameter: {}", RETRY_COUNT, e);
                0
            }
        };

        let display_name = match parameters.get::<String>(DISPLAY_NAME).await {
            Ok(Some(name)) if !name.is_empty() => name,
            _ if !invocation.display_name.is_empty() => invocation.display_name.clone(),
            _ => policy.display_name.clone(),
        };

        let context = invocation.context().unwrap_or_else(|| {
            let context = ExecutionContext::new();
            debug!(
                job_id = %job_id,
                "Invocation carries no context, using correlation id {}",
                context.correlation_id()
            );
            context
        });

        ExecutionRecord {
            job_id: job_id.clone(),
            attempt,
            display_name,
            policy,
            context,
            scope: self.scope_factory.create_scope(job_id),
        }
    }

    /// Run creating-hooks ascending. Failures are logged and isolated.
    pub async fn run_creating(&self, ctx: &mut CreatingContext) {
        for filter in &self.filters {
            if let Err(e) = filter.on_creating(ctx).await {
                warn!(filter = filter.name(), "Creating hook failed: {}", e);
            }
        }
    }

    pub async fn run_created(&self, ctx: &CreatedContext<'_>) {
        for filter in &self.filters {
            if let Err(e) = filter.on_created(ctx).await {
                warn!(job_id = %ctx.job_id, filter = filter.name(), "Created hook failed: {}", e);
            }
        }
    }

    /// Run election hooks ascending; each may replace the candidate state.
    pub async fn elect_state(&self, ctx: &mut ElectStateContext<'_>) {
        for filter in &self.filters {
            if let Err(e) = filter.on_state_election(ctx).await {
                warn!(
                    job_id = %ctx.job_id,
                    filter = filter.name(),
                    "State election hook failed: {}",
                    e
                );
            }
        }
    }

    pub async fn state_applied(&self, ctx: &ApplyStateContext<'_>) {
        for filter in &self.filters {
            if let Err(e) = filter.on_state_applied(ctx).await {
                warn!(
                    job_id = %ctx.job_id,
                    filter = filter.name(),
                    "State applied hook failed: {}",
                    e
                );
            }
        }
    }

    pub async fn state_unapplied(&self, ctx: &ApplyStateContext<'_>) {
        for filter in &self.filters {
            if let Err(e) = filter.on_state_unapplied(ctx).await {
                warn!(
                    job_id = %ctx.job_id,
                    filter = filter.name(),
                    "State unapplied hook failed: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
