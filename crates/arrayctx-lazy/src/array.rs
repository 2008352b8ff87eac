//! Lazy array payload: a handle to one node of a staged graph

use crate::graph::Node;
use arrayctx_core::{ArrayMeta, BackendArray, DType};
use std::any::Any;
use std::sync::Arc;

/// Deferred N-dimensional array
#[derive(Debug)]
pub struct LazyArray {
    node: Arc<Node>,
    meta: ArrayMeta,
}

impl LazyArray {
    pub fn new(node: Arc<Node>, shape: Vec<usize>) -> Self {
        let meta = ArrayMeta::new(shape, DType::Float64);
        Self { node, meta }
    }

    /// The staged graph node this array stands for
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

impl BackendArray for LazyArray {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
