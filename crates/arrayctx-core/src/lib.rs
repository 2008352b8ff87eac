//! arrayctx core - Array contexts and container traversal
//!
//! This crate defines the capability interface that all array backends
//! implement, plus a generic traversal engine for nested containers of
//! arrays. Algorithms written against these interfaces run unchanged on
//! any backend (eager host, GPU-dispatched, lazily-staged).

pub mod array;
pub mod cache;
pub mod container;
pub mod context;
pub mod dtype;
pub mod error;
pub mod registry;
pub mod traversal;

pub use array::{broadcast_shapes, ArrayMeta, ArrayRef, BackendArray, ContextId, HostArray};
pub use cache::{get_or_compile, CompilationCache, StructuralSignature};
pub use container::{ContainerField, ContainerRef, Key, Path, Value, ValueMap, ValueSeq};
pub use context::{next_context_id, ArrayContext, BinaryOp, CompiledFn, ContainerFn, UnaryOp};
pub use dtype::DType;
pub use error::{ArrayCtxError, Result};
pub use registry::{is_container, register, ContainerDescriptor};
pub use traversal::{
    enumerate_leaves, map_binary, map_leaves, map_leaves_with_path, map_scalar, map_unary,
    multimap_leaves, reconstruct, reduce_leaves,
};
