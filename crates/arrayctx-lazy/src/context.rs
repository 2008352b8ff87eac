//! Lazy array context

use crate::array::LazyArray;
use crate::graph::{evaluate, Node};
use arrayctx_core::{
    broadcast_shapes, enumerate_leaves, reconstruct, ArrayContext, ArrayCtxError, ArrayRef,
    BinaryOp, CompilationCache, CompiledFn, ContainerFn, ContextId, HostArray, Result, UnaryOp,
    Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "lazy";

struct Inner {
    id: ContextId,
    cache: CompilationCache,
    compiles: AtomicUsize,
}

/// Array context that stages operations into deferred graphs
#[derive(Clone)]
pub struct LazyContext {
    inner: Arc<Inner>,
}

impl LazyContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: arrayctx_core::next_context_id(),
                cache: CompilationCache::new(),
                compiles: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of `compile` invocations (traces) this context has performed
    pub fn compile_count(&self) -> usize {
        self.inner.compiles.load(Ordering::SeqCst)
    }

    fn wrap_node(&self, node: Arc<Node>, shape: Vec<usize>) -> ArrayRef {
        ArrayRef::new(Arc::new(LazyArray::new(node, shape)), self.id())
    }

    fn wrap_source(&self, data: HostArray) -> ArrayRef {
        let shape = data.shape().to_vec();
        self.wrap_node(Arc::new(Node::Source(data)), shape)
    }

    fn staged<'a>(&self, array: &'a ArrayRef, op: &'static str) -> Result<&'a LazyArray> {
        self.check_owned(array)?;
        array
            .downcast::<LazyArray>()
            .ok_or_else(|| ArrayCtxError::Backend {
                backend: BACKEND,
                op,
                message: "array payload is not a lazy array".into(),
            })
    }
}

impl Default for LazyContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayContext for LazyContext {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn id(&self) -> ContextId {
        self.inner.id
    }

    fn compilation_cache(&self) -> &CompilationCache {
        &self.inner.cache
    }

    fn from_host(&self, data: HostArray) -> Result<ArrayRef> {
        Ok(self.wrap_source(data))
    }

    /// Freeze: forces evaluation of the deferred graph behind `array`.
    fn to_host(&self, array: &ArrayRef) -> Result<HostArray> {
        let lazy = self.staged(array, "to_host")?;
        let mut memo = HashMap::new();
        evaluate(lazy.node(), &[], &mut memo)
    }

    fn unary(&self, op: UnaryOp, a: &ArrayRef) -> Result<ArrayRef> {
        let x = self.staged(a, op.name())?;
        let node = Arc::new(Node::Unary {
            op,
            input: x.node().clone(),
        });
        Ok(self.wrap_node(node, a.shape().to_vec()))
    }

    fn binary(&self, op: BinaryOp, a: &ArrayRef, b: &ArrayRef) -> Result<ArrayRef> {
        let x = self.staged(a, op.name())?;
        let y = self.staged(b, op.name())?;
        let shape =
            broadcast_shapes(a.shape(), b.shape()).map_err(|e| ArrayCtxError::Backend {
                backend: BACKEND,
                op: op.name(),
                message: e.to_string(),
            })?;
        let node = Arc::new(Node::Binary {
            op,
            lhs: x.node().clone(),
            rhs: y.node().clone(),
        });
        Ok(self.wrap_node(node, shape))
    }

    fn binary_scalar(&self, op: BinaryOp, a: &ArrayRef, scalar: f64) -> Result<ArrayRef> {
        let x = self.staged(a, op.name())?;
        let node = Arc::new(Node::BinaryScalar {
            op,
            input: x.node().clone(),
            scalar,
        });
        Ok(self.wrap_node(node, a.shape().to_vec()))
    }

    /// Trace `f` through shape-only placeholders minted from `example`, then
    /// return a callable that binds fresh inputs positionally into the
    /// staged graph and evaluates it.
    fn compile(&self, f: &ContainerFn, example: &Value) -> Result<CompiledFn> {
        self.inner.compiles.fetch_add(1, Ordering::SeqCst);

        // One placeholder per array-leaf position, in enumeration order.
        // Scalar leaves stay inline: they are constants of the trace.
        let leaves = enumerate_leaves(example)?;
        let mut traced_leaves = Vec::with_capacity(leaves.len());
        let mut input_count = 0usize;
        for (_, leaf) in &leaves {
            match leaf {
                Value::Array(a) => {
                    let shape = a.shape().to_vec();
                    let node = Arc::new(Node::Placeholder {
                        index: input_count,
                        shape: shape.clone(),
                    });
                    traced_leaves.push(Value::Array(self.wrap_node(node, shape)));
                    input_count += 1;
                }
                other => traced_leaves.push(other.clone()),
            }
        }
        let traced_input = reconstruct(example, traced_leaves)?;

        debug!(function = f.name(), placeholders = input_count, "tracing");
        let traced_output = f.call(self, &traced_input)?;

        let ctx = self.clone();
        Ok(CompiledFn::new(move |input| {
            let mut bindings = Vec::with_capacity(input_count);
            for (_, leaf) in enumerate_leaves(input)? {
                if let Value::Array(a) = leaf {
                    ctx.check_owned(&a)?;
                    bindings.push(ctx.to_host(&a)?);
                }
            }
            if bindings.len() != input_count {
                return Err(ArrayCtxError::ShapeMismatch(format!(
                    "compiled function expects {} array leaves, got {}",
                    input_count,
                    bindings.len()
                )));
            }

            // Shared staged subgraphs evaluate once per call.
            let mut memo = HashMap::new();
            arrayctx_core::map_leaves(
                |leaf| {
                    let lazy = leaf.downcast::<LazyArray>().ok_or_else(|| {
                        ArrayCtxError::Backend {
                            backend: BACKEND,
                            op: "compile",
                            message: "traced output leaf is not a lazy array".into(),
                        }
                    })?;
                    let host = evaluate(lazy.node(), &bindings, &mut memo)?;
                    Ok(ctx.wrap_source(host))
                },
                &traced_output,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn host(data: Vec<f64>, shape: &[usize]) -> HostArray {
        ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
    }

    #[test]
    fn test_deferred_until_freeze() {
        let ctx = LazyContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0, 3.0], &[3])).unwrap();
        let b = ctx.binary_scalar(BinaryOp::Mul, &a, 10.0).unwrap();
        let c = ctx.unary(UnaryOp::Neg, &b).unwrap();
        // Nothing has run yet; freeze forces the whole chain.
        let out = ctx.to_host(&c).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[-10.0, -20.0, -30.0]);
    }

    #[test]
    fn test_binary_broadcast_shape() {
        let ctx = LazyContext::new();
        let a = ctx
            .from_host(host(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]))
            .unwrap();
        let b = ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap();
        let c = ctx.binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        let out = ctx.to_host(&c).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[2.0, 4.0, 4.0, 6.0]);
    }

    #[test]
    fn test_incompatible_shapes_fail_at_staging() {
        let ctx = LazyContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0, 3.0], &[3])).unwrap();
        let b = ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap();
        assert!(ctx.binary(BinaryOp::Add, &a, &b).is_err());
    }

    #[test]
    fn test_compile_and_call() {
        let ctx = LazyContext::new();
        let double = ContainerFn::new("double", |ctx, v| {
            arrayctx_core::map_scalar(ctx, BinaryOp::Mul, v, 2.0)
        });
        let example = Value::Array(ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap());
        let compiled = ctx.compile(&double, &example).unwrap();
        assert_eq!(ctx.compile_count(), 1);

        let input = Value::Array(ctx.from_host(host(vec![5.0, 6.0], &[2])).unwrap());
        let output = compiled.call(&input).unwrap();
        let out = ctx.to_host(output.as_array().unwrap()).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[10.0, 12.0]);
    }

    #[test]
    fn test_placeholder_cannot_escape() {
        let ctx = LazyContext::new();
        // Freezing a traced argument means branching on concrete values,
        // which tracing forbids.
        let freezing = ContainerFn::new("freezing", |ctx, v| {
            let a = v.as_array().unwrap();
            let _ = ctx.to_host(a)?;
            Ok(v.clone())
        });
        let example = Value::Array(ctx.from_host(host(vec![1.0], &[1])).unwrap());
        let err = ctx.compile(&freezing, &example).unwrap_err();
        assert!(matches!(err, ArrayCtxError::Backend { backend: "lazy", .. }));
    }
}
