//! Handler dispatch.
//!
//! Handlers are registered per job type and variant and stored type-erased.
//! Dispatch decodes the persisted job value back into its concrete type and
//! calls the handler with exactly the job and its context.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jobkit_protocols::{
    DelayedJob, DispatchError, ExecutionContext, ExecutionScope, Invocation, Job, JobError,
    JobExecutor, JobHandler, JobKind, RecurringJob,
};
use tracing::debug;

use crate::error::RegistryError;

type HandlerFactory<J> = Arc<dyn Fn(&ExecutionScope) -> Arc<dyn JobHandler<J>> + Send + Sync>;

enum HandlerSource<J: Job> {
    /// One handler instance shared by all executions.
    Shared(Arc<dyn JobHandler<J>>),
    /// Built per execution from the attempt's scope.
    Scoped(HandlerFactory<J>),
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(
        &self,
        invocation: &Invocation,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError>;
}

struct TypedHandler<J: Job> {
    source: HandlerSource<J>,
}

#[async_trait]
impl<J: Job> ErasedHandler for TypedHandler<J> {
    async fn call(
        &self,
        invocation: &Invocation,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError> {
        let job: J = invocation.decode_job()?;
        let handler = match &self.source {
            HandlerSource::Shared(handler) => handler.clone(),
            HandlerSource::Scoped(factory) => factory(scope),
        };
        handler.execute(job, context).await?;
        Ok(())
    }
}

/// Registry of job handlers keyed by job type and variant.
pub struct HandlerRegistry {
    handlers: DashMap<(String, JobKind), Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register the handler for one-shot job type `J`.
    pub fn register_delayed<J, H>(&self, handler: H) -> Result<(), RegistryError>
    where
        J: DelayedJob,
        H: JobHandler<J> + 'static,
    {
        self.insert::<J>(JobKind::OneShot, HandlerSource::Shared(Arc::new(handler)))
    }

    /// Register the handler for recurring job type `J`.
    pub fn register_recurring<J, H>(&self, handler: H) -> Result<(), RegistryError>
    where
        J: RecurringJob,
        H: JobHandler<J> + 'static,
    {
        self.insert::<J>(JobKind::Recurring, HandlerSource::Shared(Arc::new(handler)))
    }

    /// Register a one-shot handler built from each attempt's scope.
    pub fn register_delayed_scoped<J, H, F>(&self, factory: F) -> Result<(), RegistryError>
    where
        J: DelayedJob,
        H: JobHandler<J> + 'static,
        F: Fn(&ExecutionScope) -> H + Send + Sync + 'static,
    {
        self.insert::<J>(JobKind::OneShot, HandlerSource::Scoped(scoped_factory(factory)))
    }

    /// Register a recurring handler built from each attempt's scope.
    pub fn register_recurring_scoped<J, H, F>(&self, factory: F) -> Result<(), RegistryError>
    where
        J: RecurringJob,
        H: JobHandler<J> + 'static,
        F: Fn(&ExecutionScope) -> H + Send + Sync + 'static,
    {
        self.insert::<J>(JobKind::Recurring, HandlerSource::Scoped(scoped_factory(factory)))
    }

    fn insert<J: Job>(&self, kind: JobKind, source: HandlerSource<J>) -> Result<(), RegistryError> {
        match self.handlers.entry((J::JOB_TYPE.to_string(), kind)) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(format!(
                "{} handler for {}",
                kind,
                J::JOB_TYPE
            ))),
            Entry::Vacant(entry) => {
                debug!("Registered {} handler for {}", kind, J::JOB_TYPE);
                entry.insert(Arc::new(TypedHandler { source }));
                Ok(())
            }
        }
    }

    /// Decode the invocation's job and run its handler.
    ///
    /// A missing handler, including one registered only for the other
    /// variant, is a configuration error.
    pub async fn dispatch(
        &self,
        invocation: &Invocation,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError> {
        let handler = self
            .handlers
            .get(&(invocation.job_type.clone(), invocation.kind))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::HandlerNotRegistered {
                job_type: invocation.job_type.clone(),
                kind: invocation.kind,
            })?;
        handler.call(invocation, context, scope).await
    }

    /// Dispatch a typed job value directly.
    pub async fn dispatch_job<J: Job>(
        &self,
        job: &J,
        kind: JobKind,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError> {
        let invocation = Invocation::for_job(job, kind, J::JOB_TYPE, context.clone()).map_err(
            |e| DispatchError::InvalidPayload {
                job_type: J::JOB_TYPE.to_string(),
                message: e.to_string(),
            },
        )?;
        self.dispatch(&invocation, context, scope).await
    }

    pub fn contains(&self, job_type: &str, kind: JobKind) -> bool {
        self.handlers.contains_key(&(job_type.to_string(), kind))
    }

    /// Registered (job type, variant) pairs, sorted.
    pub fn list(&self) -> Vec<(String, JobKind)> {
        let mut keys: Vec<_> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for HandlerRegistry {
    async fn execute(
        &self,
        invocation: &Invocation,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError> {
        self.dispatch(invocation, context, scope).await
    }
}

fn scoped_factory<J, H, F>(factory: F) -> HandlerFactory<J>
where
    J: Job,
    H: JobHandler<J> + 'static,
    F: Fn(&ExecutionScope) -> H + Send + Sync + 'static,
{
    Arc::new(move |scope: &ExecutionScope| {
        Arc::new(factory(scope)) as Arc<dyn JobHandler<J>>
    })
}

/// Handler backed by an async closure.
pub struct FnHandler<J, F> {
    f: F,
    _job: PhantomData<fn(J)>,
}

/// Adapt an async closure into a [`JobHandler`].
pub fn handler_fn<J, F, Fut>(f: F) -> FnHandler<J, F>
where
    J: Job,
    F: Fn(J, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    FnHandler {
        f,
        _job: PhantomData,
    }
}

#[async_trait]
impl<J, F, Fut> JobHandler<J> for FnHandler<J, F>
where
    J: Job,
    F: Fn(J, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn execute(&self, job: J, context: ExecutionContext) -> Result<(), JobError> {
        (self.f)(job, context).await
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
