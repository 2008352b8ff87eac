//! The array context capability interface
//!
//! An array context is a handle to one backend instance. Every backend
//! implements the same flat capability set; adding a backend never touches
//! existing ones. Arrays created under one context may never flow into
//! operations scoped to another.

use crate::array::{ArrayRef, ContextId, HostArray};
use crate::cache::CompilationCache;
use crate::container::Value;
use crate::error::{ArrayCtxError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh process-unique context identifier
pub fn next_context_id() -> ContextId {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Elementwise unary operations dispatched through a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tanh,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tanh => "tanh",
        }
    }

    /// Scalar kernel, shared by the host-evaluating backends
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

/// Elementwise binary operations dispatched through a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Maximum,
    Minimum,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::Maximum => "maximum",
            BinaryOp::Minimum => "minimum",
        }
    }

    /// Scalar kernel, shared by the host-evaluating backends
    pub fn apply(&self, x: f64, y: f64) -> f64 {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            BinaryOp::Pow => x.powf(y),
            BinaryOp::Maximum => x.max(y),
            BinaryOp::Minimum => x.min(y),
        }
    }
}

/// A pure container-to-container function eligible for compilation.
///
/// Clones share identity: the compilation cache keys on the underlying
/// allocation, so a cloned `ContainerFn` hits the same cache entries.
#[derive(Clone)]
pub struct ContainerFn {
    name: &'static str,
    inner: Arc<dyn Fn(&dyn ArrayContext, &Value) -> Result<Value> + Send + Sync>,
}

impl ContainerFn {
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&dyn ArrayContext, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name,
            inner: Arc::new(f),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the uncompiled form under a context
    pub fn call(&self, ctx: &dyn ArrayContext, input: &Value) -> Result<Value> {
        (self.inner)(ctx, input)
    }

    /// Cache identity of this function
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl std::fmt::Debug for ContainerFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContainerFn({})", self.name)
    }
}

/// Backend-compiled form of a [`ContainerFn`].
///
/// Behaviorally equivalent to the uncompiled function on equal inputs;
/// performance characteristics are the backend's business.
#[derive(Clone)]
pub struct CompiledFn {
    inner: Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
}

impl CompiledFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, input: &Value) -> Result<Value> {
        (self.inner)(input)
    }
}

impl std::fmt::Debug for CompiledFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompiledFn")
    }
}

/// Capability set every backend adapter implements.
///
/// One implementation per backend variant; the core calls only these
/// operations, never backend-native APIs. Backend failures surface as
/// [`ArrayCtxError::Backend`] with the backend identity and operation name
/// attached; the core never retries.
pub trait ArrayContext: Send + Sync {
    /// Backend identity (e.g. `"eager"`, `"lazy"`)
    fn backend(&self) -> &'static str;

    /// Process-unique identifier of this context instance
    fn id(&self) -> ContextId;

    /// The compilation cache owned by this context
    fn compilation_cache(&self) -> &CompilationCache;

    /// Ingest host-resident numeric data
    fn from_host(&self, data: HostArray) -> Result<ArrayRef>;

    /// Force materialization to host data ("freeze").
    ///
    /// Blocking: for lazy backends this evaluates any deferred graph, and
    /// after it returns the result is fully computed and safe to read from
    /// any thread.
    fn to_host(&self, array: &ArrayRef) -> Result<HostArray>;

    /// Stage host data back into backend-managed form ("thaw").
    /// Identical to `from_host` for backends without a staged representation.
    fn thaw(&self, data: HostArray) -> Result<ArrayRef> {
        self.from_host(data)
    }

    /// Elementwise unary dispatch
    fn unary(&self, op: UnaryOp, a: &ArrayRef) -> Result<ArrayRef>;

    /// Elementwise binary dispatch; leaf-level numeric broadcasting is the
    /// backend's business
    fn binary(&self, op: BinaryOp, a: &ArrayRef, b: &ArrayRef) -> Result<ArrayRef>;

    /// Elementwise binary dispatch against a scalar constant
    fn binary_scalar(&self, op: BinaryOp, a: &ArrayRef, scalar: f64) -> Result<ArrayRef>;

    /// Escape hatch for invoking a precompiled backend kernel by name.
    /// Not required of all backends.
    fn call_kernel(&self, name: &str, _inputs: &[&ArrayRef]) -> Result<ArrayRef> {
        Err(ArrayCtxError::Backend {
            backend: self.backend(),
            op: "call_kernel",
            message: format!("kernel {name:?} is not supported by this backend"),
        })
    }

    /// Compile a pure container-to-container function.
    ///
    /// Idempotent in effect: the compiled and uncompiled forms agree on equal
    /// inputs. Lazy backends trace `f` with shape-only placeholders built
    /// from `example`, so `f` must not branch on concrete array values.
    /// Backends without a compilation step wrap `f` unchanged.
    fn compile(&self, f: &ContainerFn, example: &Value) -> Result<CompiledFn>;

    /// Check that an array belongs to this context
    fn check_owned(&self, array: &ArrayRef) -> Result<()> {
        if array.context_id() != self.id() {
            return Err(ArrayCtxError::ContextMismatch {
                expected: self.id(),
                got: array.context_id(),
                backend: self.backend(),
            });
        }
        Ok(())
    }
}
