//! Runtime errors.

use jobkit_config::ConfigError;
use jobkit_core::RegistryError;
use jobkit_protocols::{EngineError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobKitError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
