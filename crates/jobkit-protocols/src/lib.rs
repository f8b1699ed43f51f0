//! # jobkit Protocols
//!
//! Interface definitions and shared types for the jobkit job execution
//! middleware. Contains no engine, registry or pipeline implementation.
//!
//! ## Core Traits
//!
//! - [`Job`] - Base trait for serializable units of work
//! - [`DelayedJob`] / [`RecurringJob`] - Variant markers (one-shot vs. scheduled)
//! - [`JobHandler`] - Executes one concrete job type
//! - [`JobExecutor`] - Resolves and runs the handler for an invocation
//! - [`JobFilter`] - Lifecycle observer invoked around every execution
//! - [`JobEngine`] - External engine that persists and re-invokes work
//! - [`ParameterStore`] - Engine-side per-invocation key/value metadata
//! - [`ScopeFactory`] - Creates the per-attempt [`ExecutionScope`]

pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handler;
pub mod invocation;
pub mod job;
pub mod policy;
pub mod scope;
pub mod state;

pub use context::{attach, recover, ExecutionContext};
pub use engine::{JobEngine, JobParameters, MisfireHandling, ParameterStore, RecurringJobOptions};
pub use error::{
    DispatchError, EngineError, FilterError, JobError, PerformError, StoreError,
};
pub use filter::{
    ApplyStateContext, CreatedContext, CreatingContext, ElectStateContext, ExecutionRecord,
    JobFilter, PerformedContext, PerformingContext,
};
pub use handler::{JobExecutor, JobHandler};
pub use invocation::{Invocation, InvocationArg};
pub use job::{DelayedJob, Job, JobId, JobKind, RecurringJob};
pub use policy::{AttemptsExceededAction, JobPolicy, DEFAULT_QUEUE, DEFAULT_RETRY_ATTEMPTS};
pub use scope::{ExecutionScope, ScopeFactory, ScopeProviders};
pub use state::{FailureInfo, JobState};

/// Well-known job parameter keys shared by the engine and the built-in filters.
pub mod parameters {
    pub const DISPLAY_NAME: &str = "DisplayName";
    pub const RETRY_ATTEMPTS: &str = "RetryAttempts";
    pub const RETRY_DELAYS: &str = "RetryDelaysInSeconds";
    pub const ON_ATTEMPTS_EXCEEDED: &str = "OnAttemptsExceeded";
    pub const EXCEPT_ON: &str = "ExceptOn";
    pub const LOG_EVENTS: &str = "LogEvents";
    pub const RETRY_COUNT: &str = "RetryCount";
    pub const RETRY_ELECTION: &str = "RetryElection";
}
