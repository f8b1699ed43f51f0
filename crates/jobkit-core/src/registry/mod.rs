//! Registries for job policies and job handlers.

mod handler;
mod policy;

pub use handler::{handler_fn, FnHandler, HandlerRegistry};
pub use policy::PolicyRegistry;
