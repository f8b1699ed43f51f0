//! Wiring of registries, filters, scope factory and engine.

use std::collections::HashSet;
use std::sync::Arc;

use jobkit_config::Config;
use jobkit_core::{HandlerRegistry, PolicyRegistry};
use jobkit_protocols::{
    DelayedJob, ExecutionScope, JobEngine, JobFilter, JobHandler, JobPolicy, RecurringJob,
    ScopeFactory, ScopeProviders,
};
use tracing::{debug, warn};

use crate::error::JobKitError;
use crate::filters::{ErrorLoggingFilter, RetryPolicyFilter};
use crate::manager::JobManager;
use crate::memory::MemoryJobEngine;
use crate::performer::JobPerformer;
use crate::pipeline::FilterPipeline;
use crate::scope::ServiceScopeFactory;

/// Builder for a [`JobKit`].
///
/// Registration errors are collected and the first one is returned by
/// [`JobKitBuilder::build`], so registrations can be chained.
pub struct JobKitBuilder {
    config: Option<Config>,
    default_queue: Option<String>,
    policies: Vec<(String, JobPolicy)>,
    handlers: HandlerRegistry,
    filters: Vec<Arc<dyn JobFilter>>,
    providers: ScopeProviders,
    scope_factory: Option<Arc<dyn ScopeFactory>>,
    error_logging: bool,
    errors: Vec<JobKitError>,
}

impl JobKitBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            default_queue: None,
            policies: Vec::new(),
            handlers: HandlerRegistry::new(),
            filters: Vec::new(),
            providers: ScopeProviders::new(),
            scope_factory: None,
            error_logging: true,
            errors: Vec::new(),
        }
    }

    /// Take job policies and the default queue from `config`.
    ///
    /// Configured policies take precedence over ones declared in code.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = Some(queue.into());
        self
    }

    /// Declare the policy of job type `J`.
    pub fn policy<J: jobkit_protocols::Job>(self, policy: JobPolicy) -> Self {
        self.policy_type(J::JOB_TYPE, policy)
    }

    pub fn policy_type(mut self, job_type: impl Into<String>, policy: JobPolicy) -> Self {
        self.policies.push((job_type.into(), policy));
        self
    }

    pub fn delayed_handler<J, H>(mut self, handler: H) -> Self
    where
        J: DelayedJob,
        H: JobHandler<J> + 'static,
    {
        if let Err(e) = self.handlers.register_delayed::<J, H>(handler) {
            self.errors.push(e.into());
        }
        self
    }

    pub fn recurring_handler<J, H>(mut self, handler: H) -> Self
    where
        J: RecurringJob,
        H: JobHandler<J> + 'static,
    {
        if let Err(e) = self.handlers.register_recurring::<J, H>(handler) {
            self.errors.push(e.into());
        }
        self
    }

    /// Register a one-shot handler built from each attempt's scope.
    pub fn delayed_handler_scoped<J, H, F>(mut self, factory: F) -> Self
    where
        J: DelayedJob,
        H: JobHandler<J> + 'static,
        F: Fn(&ExecutionScope) -> H + Send + Sync + 'static,
    {
        if let Err(e) = self.handlers.register_delayed_scoped::<J, H, F>(factory) {
            self.errors.push(e.into());
        }
        self
    }

    /// Register a recurring handler built from each attempt's scope.
    pub fn recurring_handler_scoped<J, H, F>(mut self, factory: F) -> Self
    where
        J: RecurringJob,
        H: JobHandler<J> + 'static,
        F: Fn(&ExecutionScope) -> H + Send + Sync + 'static,
    {
        if let Err(e) = self.handlers.register_recurring_scoped::<J, H, F>(factory) {
            self.errors.push(e.into());
        }
        self
    }

    /// Add a custom filter. Negative orders are reserved for built-in filters.
    pub fn filter(mut self, filter: Arc<dyn JobFilter>) -> Self {
        if filter.execution_order() < 0 {
            warn!(
                filter = filter.name(),
                order = filter.execution_order(),
                "Custom filter uses a negative execution order reserved for built-in filters"
            );
        }
        self.filters.push(filter);
        self
    }

    /// Register a scoped service built lazily once per attempt.
    pub fn scoped<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ExecutionScope) -> T + Send + Sync + 'static,
    {
        self.providers.provide(factory);
        self
    }

    /// Replace the scope factory. Scoped services registered with
    /// [`JobKitBuilder::scoped`] are ignored when one is set.
    pub fn scope_factory(mut self, factory: Arc<dyn ScopeFactory>) -> Self {
        self.scope_factory = Some(factory);
        self
    }

    /// Leave out the built-in [`ErrorLoggingFilter`].
    pub fn without_error_logging(mut self) -> Self {
        self.error_logging = false;
        self
    }

    /// Build with the in-memory engine.
    pub fn build(self) -> Result<JobKit<MemoryJobEngine>, JobKitError> {
        self.build_with(MemoryJobEngine::new)
    }

    /// Build with an engine created from the assembled performer.
    pub fn build_with<E, F>(mut self, engine: F) -> Result<JobKit<E>, JobKitError>
    where
        E: JobEngine + 'static,
        F: FnOnce(Arc<JobPerformer>) -> E,
    {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        let policies = Arc::new(self.build_policies()?);

        let mut filters: Vec<Arc<dyn JobFilter>> =
            vec![Arc::new(RetryPolicyFilter::new(policies.clone()))];
        if self.error_logging {
            filters.push(Arc::new(ErrorLoggingFilter::new()));
        }
        filters.extend(self.filters);

        let scope_factory = self
            .scope_factory
            .unwrap_or_else(|| Arc::new(ServiceScopeFactory::new(self.providers)));

        let pipeline = Arc::new(FilterPipeline::new(filters, scope_factory, policies.clone()));
        let handlers = Arc::new(self.handlers);
        let performer = Arc::new(JobPerformer::new(pipeline, handlers.clone()));
        let engine = Arc::new(engine(performer.clone()));
        let manager = JobManager::new(engine.clone(), policies.clone());

        debug!(
            policies = policies.len(),
            handlers = handlers.len(),
            filters = performer.pipeline().filters().len(),
            "JobKit built"
        );

        Ok(JobKit {
            manager,
            performer,
            policies,
            handlers,
            engine,
        })
    }

    fn build_policies(&mut self) -> Result<PolicyRegistry, JobKitError> {
        let registry = match (&self.config, &self.default_queue) {
            (_, Some(queue)) => PolicyRegistry::with_default_queue(queue.clone()),
            (Some(config), None) => PolicyRegistry::with_default_queue(config.defaults.queue.clone()),
            (None, None) => PolicyRegistry::new(),
        };

        let mut configured = HashSet::new();
        if let Some(config) = &self.config {
            for job_type in config.jobs.keys() {
                if let Some(policy) = config.policy(job_type) {
                    registry.register_type(job_type.clone(), policy)?;
                    configured.insert(job_type.clone());
                }
            }
        }

        for (job_type, policy) in self.policies.drain(..) {
            if configured.contains(&job_type) {
                debug!("Configured policy for {} takes precedence", job_type);
                continue;
            }
            registry.register_type(job_type, policy)?;
        }
        Ok(registry)
    }
}

impl Default for JobKitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembled job middleware around engine `E`.
pub struct JobKit<E> {
    manager: JobManager,
    performer: Arc<JobPerformer>,
    policies: Arc<PolicyRegistry>,
    handlers: Arc<HandlerRegistry>,
    engine: Arc<E>,
}

impl JobKit<MemoryJobEngine> {
    pub fn builder() -> JobKitBuilder {
        JobKitBuilder::new()
    }
}

impl<E> JobKit<E> {
    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn performer(&self) -> &Arc<JobPerformer> {
        &self.performer
    }

    pub fn pipeline(&self) -> &Arc<FilterPipeline> {
        self.performer.pipeline()
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

#[cfg(test)]
#[path = "kit_tests.rs"]
mod tests;
