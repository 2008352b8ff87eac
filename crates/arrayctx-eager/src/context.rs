//! Eager array context

use crate::array::EagerArray;
use arrayctx_core::{
    broadcast_shapes, ArrayContext, ArrayCtxError, ArrayRef, BinaryOp, CompilationCache,
    CompiledFn, ContainerFn, ContextId, HostArray, Result, UnaryOp, Value,
};
use ndarray::{ArrayD, IxDyn, Zip};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BACKEND: &str = "eager";

struct Inner {
    id: ContextId,
    cache: CompilationCache,
    compiles: AtomicUsize,
}

/// Array context executing every operation immediately on host buffers
#[derive(Clone)]
pub struct EagerContext {
    inner: Arc<Inner>,
}

impl EagerContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: arrayctx_core::next_context_id(),
                cache: CompilationCache::new(),
                compiles: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of `compile` invocations this context has performed
    pub fn compile_count(&self) -> usize {
        self.inner.compiles.load(Ordering::SeqCst)
    }

    fn wrap(&self, data: HostArray) -> ArrayRef {
        ArrayRef::new(Arc::new(EagerArray::from_host(data)), self.id())
    }

    fn buffer<'a>(&self, array: &'a ArrayRef, op: &'static str) -> Result<&'a HostArray> {
        self.check_owned(array)?;
        array
            .downcast::<EagerArray>()
            .map(EagerArray::data)
            .ok_or_else(|| ArrayCtxError::Backend {
                backend: BACKEND,
                op,
                message: "array payload is not an eager host array".into(),
            })
    }

    fn elementwise_binary(
        &self,
        op: BinaryOp,
        a: &HostArray,
        b: &HostArray,
    ) -> Result<HostArray> {
        let shape = broadcast_shapes(a.shape(), b.shape()).map_err(|e| {
            ArrayCtxError::Backend {
                backend: BACKEND,
                op: op.name(),
                message: e.to_string(),
            }
        })?;
        let lhs = a.broadcast(IxDyn(&shape)).ok_or_else(|| broadcast_error(op, a))?;
        let rhs = b.broadcast(IxDyn(&shape)).ok_or_else(|| broadcast_error(op, b))?;
        let mut out = ArrayD::zeros(IxDyn(&shape));
        Zip::from(&mut out)
            .and(&lhs)
            .and(&rhs)
            .for_each(|o, &x, &y| *o = op.apply(x, y));
        Ok(out)
    }
}

fn broadcast_error(op: BinaryOp, operand: &HostArray) -> ArrayCtxError {
    ArrayCtxError::Backend {
        backend: BACKEND,
        op: op.name(),
        message: format!("cannot broadcast operand of shape {:?}", operand.shape()),
    }
}

impl Default for EagerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayContext for EagerContext {
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
        Ok(self.wrap(data))
    }

    fn to_host(&self, array: &ArrayRef) -> Result<HostArray> {
        Ok(self.buffer(array, "to_host")?.clone())
    }

    fn unary(&self, op: UnaryOp, a: &ArrayRef) -> Result<ArrayRef> {
        let x = self.buffer(a, op.name())?;
        Ok(self.wrap(x.mapv(|v| op.apply(v))))
    }

    fn binary(&self, op: BinaryOp, a: &ArrayRef, b: &ArrayRef) -> Result<ArrayRef> {
        let x = self.buffer(a, op.name())?;
        let y = self.buffer(b, op.name())?;
        Ok(self.wrap(self.elementwise_binary(op, x, y)?))
    }

    fn binary_scalar(&self, op: BinaryOp, a: &ArrayRef, scalar: f64) -> Result<ArrayRef> {
        let x = self.buffer(a, op.name())?;
        Ok(self.wrap(x.mapv(|v| op.apply(v, scalar))))
    }

    /// One precompiled kernel is exposed by name: `"sum"`, the elementwise
    /// sum of all inputs.
    fn call_kernel(&self, name: &str, inputs: &[&ArrayRef]) -> Result<ArrayRef> {
        match name {
            "sum" => {
                let first = inputs.first().copied().ok_or_else(|| ArrayCtxError::Backend {
                    backend: BACKEND,
                    op: "call_kernel",
                    message: "kernel \"sum\" needs at least one input".into(),
                })?;
                let mut acc = self.buffer(first, "call_kernel")?.clone();
                for &input in &inputs[1..] {
                    let x = self.buffer(input, "call_kernel")?;
                    acc = self.elementwise_binary(BinaryOp::Add, &acc, x)?;
                }
                Ok(self.wrap(acc))
            }
            _ => Err(ArrayCtxError::Backend {
                backend: BACKEND,
                op: "call_kernel",
                message: format!("kernel {name:?} is not supported by this backend"),
            }),
        }
    }

    fn compile(&self, f: &ContainerFn, _example: &Value) -> Result<CompiledFn> {
        self.inner.compiles.fetch_add(1, Ordering::SeqCst);
        let ctx = self.clone();
        let f = f.clone();
        Ok(CompiledFn::new(move |input| f.call(&ctx, input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(data: Vec<f64>, shape: &[usize]) -> HostArray {
        ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
    }

    #[test]
    fn test_from_to_host_roundtrip() {
        let ctx = EagerContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0, 3.0], &[3])).unwrap();
        assert_eq!(a.shape(), &[3]);
        let back = ctx.to_host(&a).unwrap();
        assert_eq!(back.as_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_binary_same_shape() {
        let ctx = EagerContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap();
        let b = ctx.from_host(host(vec![10.0, 20.0], &[2])).unwrap();
        let c = ctx.binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(ctx.to_host(&c).unwrap().as_slice().unwrap(), &[11.0, 22.0]);
    }

    #[test]
    fn test_binary_broadcast() {
        let ctx = EagerContext::new();
        let a = ctx
            .from_host(host(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]))
            .unwrap();
        let b = ctx.from_host(host(vec![10.0, 100.0], &[2])).unwrap();
        let c = ctx.binary(BinaryOp::Mul, &a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(
            ctx.to_host(&c).unwrap().as_slice().unwrap(),
            &[10.0, 200.0, 30.0, 400.0]
        );
    }

    #[test]
    fn test_binary_incompatible_shapes() {
        let ctx = EagerContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0, 3.0], &[3])).unwrap();
        let b = ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap();
        let err = ctx.binary(BinaryOp::Add, &a, &b).unwrap_err();
        assert!(matches!(err, ArrayCtxError::Backend { backend: "eager", .. }));
    }

    #[test]
    fn test_sum_kernel() {
        let ctx = EagerContext::new();
        let a = ctx.from_host(host(vec![1.0, 2.0], &[2])).unwrap();
        let b = ctx.from_host(host(vec![3.0, 4.0], &[2])).unwrap();
        let c = ctx.from_host(host(vec![5.0, 6.0], &[2])).unwrap();
        let s = ctx.call_kernel("sum", &[&a, &b, &c]).unwrap();
        assert_eq!(ctx.to_host(&s).unwrap().as_slice().unwrap(), &[9.0, 12.0]);
    }

    #[test]
    fn test_unknown_kernel() {
        let ctx = EagerContext::new();
        let a = ctx.from_host(host(vec![1.0], &[1])).unwrap();
        assert!(ctx.call_kernel("fft", &[&a]).is_err());
    }

    #[test]
    fn test_foreign_array_rejected() {
        let ctx_a = EagerContext::new();
        let ctx_b = EagerContext::new();
        let a = ctx_a.from_host(host(vec![1.0], &[1])).unwrap();
        let err = ctx_b.unary(UnaryOp::Neg, &a).unwrap_err();
        assert!(matches!(err, ArrayCtxError::ContextMismatch { .. }));
    }
}
