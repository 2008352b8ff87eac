//! Opaque array handles and backend-agnostic metadata

use crate::dtype::DType;
use crate::error::{ArrayCtxError, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Host-resident numeric data. This is the only representation that crosses
/// the `from_host`/`to_host` boundary of an array context.
pub type HostArray = ArrayD<f64>;

/// Identifier of one array context instance.
pub type ContextId = u64;

/// Metadata about an array (backend-agnostic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl ArrayMeta {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn nbytes(&self) -> usize {
        self.size() * self.dtype.size()
    }
}

/// Backend-native array payload.
///
/// The core never looks inside; backends downcast via [`ArrayRef::downcast`]
/// when dispatching operations on their own arrays.
pub trait BackendArray: Any + Send + Sync + fmt::Debug {
    /// Get array metadata
    fn meta(&self) -> &ArrayMeta;

    /// Upcast for downcasting to the concrete backend type
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a backend array, tagged with the owning context.
///
/// Cloning is cheap and clones share the underlying payload; two handles are
/// "the same array" exactly when they share the payload allocation, which is
/// the identity the traversal engine memoizes on.
#[derive(Clone, Debug)]
pub struct ArrayRef {
    payload: Arc<dyn BackendArray>,
    context: ContextId,
}

impl ArrayRef {
    pub fn new(payload: Arc<dyn BackendArray>, context: ContextId) -> Self {
        Self { payload, context }
    }

    pub fn meta(&self) -> &ArrayMeta {
        self.payload.meta()
    }

    pub fn shape(&self) -> &[usize] {
        &self.meta().shape
    }

    pub fn ndim(&self) -> usize {
        self.meta().ndim()
    }

    pub fn size(&self) -> usize {
        self.meta().size()
    }

    pub fn dtype(&self) -> DType {
        self.meta().dtype
    }

    /// Context instance this array belongs to
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Downcast the payload to a concrete backend array type
    pub fn downcast<T: BackendArray>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    /// Whether two handles refer to the same underlying array
    pub fn same_array(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.payload) as *const () as usize
    }
}

/// Broadcast two shapes under the right-aligned NumPy rule.
///
/// Dimensions are compared from the trailing end; a dimension of 1 stretches
/// to match its counterpart.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[ndim - 1 - i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(ArrayCtxError::ShapeMismatch(format!(
                "shapes {a:?} and {b:?} are not broadcast-compatible"
            )));
        };
    }
    Ok(out)
}
