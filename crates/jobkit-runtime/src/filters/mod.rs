//! Built-in job filters.

mod error_logging;
mod retry_policy;
mod timing;

pub use error_logging::{ErrorLoggingFilter, ERROR_LOGGING_ORDER};
pub use retry_policy::{RetryPolicyFilter, RETRY_POLICY_ORDER};
pub use timing::{TimingFilter, TimingStats, TIMING_ORDER};
