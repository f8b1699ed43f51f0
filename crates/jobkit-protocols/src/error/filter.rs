//! Filter hook errors.

use thiserror::Error;

use super::engine::StoreError;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter {filter} failed: {message}")]
    Hook { filter: String, message: String },

    #[error("Parameter store error: {0}")]
    Store(#[from] StoreError),
}

impl FilterError {
    pub fn hook(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            filter: filter.into(),
            message: message.into(),
        }
    }
}
