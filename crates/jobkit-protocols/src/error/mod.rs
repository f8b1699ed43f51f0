//! Error types for the jobkit protocol layer.

mod dispatch;
mod engine;
mod filter;
mod job;
mod perform;

pub use dispatch::*;
pub use engine::*;
pub use filter::*;
pub use job::*;
pub use perform::*;
