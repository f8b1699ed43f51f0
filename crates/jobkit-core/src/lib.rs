//! # jobkit Core
//!
//! Registries binding job types to their metadata and handlers.
//!
//! ## Components
//!
//! - [`PolicyRegistry`] - Job type to [`JobPolicy`](jobkit_protocols::JobPolicy), frozen once resolved
//! - [`HandlerRegistry`] - Job type and variant to a type-erased handler
//! - [`handler_fn`] - Adapts an async closure into a handler

pub mod error;
pub mod registry;

pub use error::RegistryError;
pub use registry::{handler_fn, FnHandler, HandlerRegistry, PolicyRegistry};
