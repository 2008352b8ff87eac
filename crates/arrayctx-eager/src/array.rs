//! Eager array payload backed by ndarray

use arrayctx_core::{ArrayMeta, BackendArray, DType, HostArray};
use std::any::Any;

/// Host-resident N-dimensional array
#[derive(Debug)]
pub struct EagerArray {
    data: HostArray,
    meta: ArrayMeta,
}

impl EagerArray {
    pub fn from_host(data: HostArray) -> Self {
        let meta = ArrayMeta::new(data.shape().to_vec(), DType::Float64);
        Self { data, meta }
    }

    /// Underlying ndarray buffer
    pub fn data(&self) -> &HostArray {
        &self.data
    }
}

impl BackendArray for EagerArray {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    #[test]
    fn test_meta_from_buffer() {
        let arr = EagerArray::from_host(ArrayD::zeros(ndarray::IxDyn(&[2, 3])));
        assert_eq!(arr.meta().shape, vec![2, 3]);
        assert_eq!(arr.meta().dtype, DType::Float64);
        assert_eq!(arr.meta().size(), 6);
    }
}
