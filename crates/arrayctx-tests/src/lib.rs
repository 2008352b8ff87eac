//! Shared test suite for arrayctx backends
//!
//! Every property here must hold for any conforming backend; the traversal
//! and cache tests run against both the eager and the lazy adapters.

pub mod cache;
pub mod container;
pub mod context;
pub mod traversal;

/// Test utilities
pub mod utils {
    use arrayctx_core::{ArrayContext, HostArray, Value};
    use ndarray::{ArrayD, IxDyn};

    /// Default tolerance for floating point comparisons
    pub const DEFAULT_TOL: f64 = 1e-12;

    pub fn host(data: Vec<f64>, shape: &[usize]) -> HostArray {
        ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
    }

    /// 1-D array leaf under `ctx`
    pub fn leaf(ctx: &dyn ArrayContext, data: Vec<f64>) -> Value {
        let shape = vec![data.len()];
        Value::Array(ctx.from_host(host(data, &shape)).unwrap())
    }

    /// Freeze an array leaf and return its flat host data
    pub fn leaf_data(ctx: &dyn ArrayContext, value: &Value) -> Vec<f64> {
        let array = value.as_array().expect("expected an array leaf");
        ctx.to_host(array).unwrap().iter().cloned().collect()
    }

    pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() && b.is_nan() {
            return true;
        }
        (a - b).abs() < tol
    }

    pub fn slices_approx_eq(a: &[f64], b: &[f64], tol: f64) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| approx_eq(x, y, tol))
    }
}

/// Container fixtures shared across the suite
pub mod fixtures {
    use arrayctx_core::ArrayRef;
    use std::sync::Once;

    /// Two-field record container: position and velocity arrays
    #[derive(Clone)]
    pub struct State {
        pub pos: ArrayRef,
        pub vel: ArrayRef,
    }

    arrayctx_core::record_container!(State { pos, vel });

    /// Installs the `State` descriptor exactly once for the test process
    pub fn ensure_state_registered() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| State::register().expect("State registration"));
    }
}
