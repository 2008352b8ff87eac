//! Compilation cache: at most one compile per (function, signature) key
//!
//! Each array context owns one cache. Lookup keys are structural signatures
//! of the example input (paths, shapes, dtypes; never array contents), so
//! two inputs of equal shape share a compiled artifact no matter what their
//! arrays hold. Scalar leaves are the exception: staging backends inline
//! them into the trace as constants, so their value is part of the key.
//!
//! Concurrent same-key requests are single-flighted: the outer map lock is
//! held only to find the slot, then the slot's own mutex is held across
//! compilation, so the first caller compiles while same-key callers block
//! and observe the finished artifact. Different keys never contend.

use crate::container::{Path, Value};
use crate::context::{ArrayContext, CompiledFn, ContainerFn};
use crate::dtype::DType;
use crate::error::{ArrayCtxError, Result};
use crate::traversal::enumerate_leaves;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Shape/dtype/nesting fingerprint of a container.
///
/// Independent of array contents, but scalar leaves key by value: a compiled
/// trace bakes them in as constants, so equal-shaped inputs with different
/// scalars must never share an artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructuralSignature {
    leaves: Vec<SignatureEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SignatureEntry {
    path: Path,
    leaf: LeafSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum LeafSignature {
    Array { shape: Vec<usize>, dtype: DType },
    // Bit pattern of the scalar; trace constants distinguish -0.0 from 0.0
    // and one NaN payload from another, so the key does too.
    Scalar { bits: u64 },
}

impl StructuralSignature {
    pub fn of(example: &Value) -> Result<Self> {
        let mut leaves = Vec::new();
        for (path, leaf) in enumerate_leaves(example)? {
            let leaf = match leaf {
                Value::Array(a) => LeafSignature::Array {
                    shape: a.shape().to_vec(),
                    dtype: a.dtype(),
                },
                Value::Scalar(s) => LeafSignature::Scalar { bits: s.to_bits() },
                Value::Container(_) => {
                    return Err(ArrayCtxError::ShapeMismatch(
                        "leaf enumeration produced a container node".into(),
                    ))
                }
            };
            leaves.push(SignatureEntry { path, leaf });
        }
        Ok(Self { leaves })
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    fn_identity: usize,
    signature: StructuralSignature,
}

struct Slot {
    // Holding a clone pins the function allocation behind `fn_identity`:
    // while any entry for it lives, a new function can never be handed the
    // same address and alias this entry's artifact.
    function: ContainerFn,
    compiled: Mutex<Option<CompiledFn>>,
}

/// Per-context cache of compiled functions
#[derive(Default)]
pub struct CompilationCache {
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cache entries (including in-flight compilations)
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up or compile `f` for the structural signature of `example`.
    ///
    /// A failed compilation leaves the slot empty; the next caller retries.
    pub fn get_or_compile(
        &self,
        ctx: &dyn ArrayContext,
        f: &ContainerFn,
        example: &Value,
    ) -> Result<CompiledFn> {
        let signature = StructuralSignature::of(example)?;
        let key = CacheKey {
            fn_identity: f.identity(),
            signature,
        };

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(Slot {
                        function: f.clone(),
                        compiled: Mutex::new(None),
                    })
                })
                .clone()
        };

        let mut compiled = slot.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = compiled.as_ref() {
            debug!(
                function = slot.function.name(),
                backend = ctx.backend(),
                "compilation cache hit"
            );
            return Ok(hit.clone());
        }

        debug!(function = f.name(), backend = ctx.backend(), "compiling");
        let artifact = ctx.compile(f, example)?;
        *compiled = Some(artifact.clone());
        Ok(artifact)
    }
}

/// Look up or compile `f` in the cache owned by `ctx`.
///
/// At most one compilation happens per `(function identity, signature)` pair
/// for the lifetime of the context.
pub fn get_or_compile(
    ctx: &dyn ArrayContext,
    f: &ContainerFn,
    example: &Value,
) -> Result<CompiledFn> {
    ctx.compilation_cache().get_or_compile(ctx, f, example)
}
