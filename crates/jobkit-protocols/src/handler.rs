//! Handler traits.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::{DispatchError, JobError};
use crate::invocation::Invocation;
use crate::job::Job;
use crate::scope::ExecutionScope;

/// Executes one concrete job type.
///
/// Handlers receive exactly the job value and its context. Services scoped
/// to the attempt are injected when the handler is built from the scope.
#[async_trait]
pub trait JobHandler<J: Job>: Send + Sync {
    async fn execute(&self, job: J, context: ExecutionContext) -> Result<(), JobError>;
}

/// Resolves and runs the handler for a persisted invocation.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        invocation: &Invocation,
        context: ExecutionContext,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError>;
}
