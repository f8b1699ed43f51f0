//! Filter pipeline capability set and hook contexts.

mod context;
mod traits;

pub use context::*;
pub use traits::*;
