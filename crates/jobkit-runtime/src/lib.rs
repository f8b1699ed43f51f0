//! # jobkit Runtime
//!
//! Execution side of jobkit.
//!
//! ## Components
//!
//! - [`FilterPipeline`] - Runs filter hooks in order around each execution and owns its scope
//! - [`retry::decide`] - Pure retry decision state machine
//! - [`RetryPolicyFilter`] - Bridges retry decisions into engine state election
//! - [`ErrorLoggingFilter`] / [`TimingFilter`] - Built-in observability filters
//! - [`JobManager`] - Submission API for one-shot and recurring jobs
//! - [`JobPerformer`] - Pipeline plus handler dispatch for one invocation
//! - [`MemoryJobEngine`] - In-process, non-durable engine implementation
//! - [`JobKit`] - Builder wiring all of the above

pub mod error;
pub mod filters;
pub mod kit;
pub mod manager;
pub mod memory;
pub mod performer;
pub mod pipeline;
pub mod retry;
pub mod schedule;
pub mod scope;

pub use error::JobKitError;
pub use filters::{ErrorLoggingFilter, RetryPolicyFilter, TimingFilter, TimingStats};
pub use kit::{JobKit, JobKitBuilder};
pub use manager::{JobManager, RecurringOptions, SubmitOptions};
pub use memory::{MemoryJobEngine, MemoryParameterStore};
pub use performer::JobPerformer;
pub use pipeline::FilterPipeline;
pub use retry::{decide, RetryDecision, RetryElection};
pub use scope::ServiceScopeFactory;
