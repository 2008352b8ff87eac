//! Eager host backend for arrayctx
//!
//! Arrays live in host memory as ndarray buffers and every operation
//! executes immediately. `compile` has no staging step and wraps functions
//! unchanged.

mod array;
mod context;

pub use array::EagerArray;
pub use context::EagerContext;
