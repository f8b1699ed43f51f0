//! # jobkit Config
//!
//! TOML configuration for jobkit: per-job-type policies, queue defaults,
//! worker server definitions and logging.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
