//! Lazily-staged backend for arrayctx
//!
//! Operations build deferred expression graphs instead of computing.
//! `to_host` (freeze) walks the graph and evaluates it on the host;
//! `compile` traces a function through shape-only placeholders and returns
//! a callable that binds fresh inputs into the staged graph.

mod array;
mod context;
mod graph;

pub use array::LazyArray;
pub use context::LazyContext;
pub use graph::Node;
