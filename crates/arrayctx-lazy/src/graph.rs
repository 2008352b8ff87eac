//! Deferred expression graphs and their host evaluation

use arrayctx_core::{broadcast_shapes, ArrayCtxError, BinaryOp, HostArray, Result, UnaryOp};
use ndarray::{ArrayD, IxDyn, Zip};
use std::collections::HashMap;
use std::sync::Arc;

const BACKEND: &str = "lazy";

/// One node of a staged computation
#[derive(Debug)]
pub enum Node {
    /// Host data captured at staging time
    Source(HostArray),
    /// Input slot of a traced function, bound at call time
    Placeholder { index: usize, shape: Vec<usize> },
    Unary {
        op: UnaryOp,
        input: Arc<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Arc<Node>,
        rhs: Arc<Node>,
    },
    BinaryScalar {
        op: BinaryOp,
        input: Arc<Node>,
        scalar: f64,
    },
}

/// Evaluate a graph to host data.
///
/// `bindings` supplies placeholder values by index; evaluating a placeholder
/// with no binding is an error (it means a traced value leaked out of its
/// compiled call). The memo is keyed on node identity so shared subgraphs
/// evaluate once per call.
pub fn evaluate(
    node: &Arc<Node>,
    bindings: &[HostArray],
    memo: &mut HashMap<usize, HostArray>,
) -> Result<HostArray> {
    let id = Arc::as_ptr(node) as *const () as usize;
    if let Some(hit) = memo.get(&id) {
        return Ok(hit.clone());
    }

    let result = match node.as_ref() {
        Node::Source(data) => data.clone(),
        Node::Placeholder { index, .. } => {
            bindings.get(*index).cloned().ok_or(ArrayCtxError::Backend {
                backend: BACKEND,
                op: "to_host",
                message: format!(
                    "cannot materialize placeholder {index}: \
                     traced values only exist inside a compiled call"
                ),
            })?
        }
        Node::Unary { op, input } => {
            let x = evaluate(input, bindings, memo)?;
            x.mapv(|v| op.apply(v))
        }
        Node::Binary { op, lhs, rhs } => {
            let x = evaluate(lhs, bindings, memo)?;
            let y = evaluate(rhs, bindings, memo)?;
            combine(*op, &x, &y)?
        }
        Node::BinaryScalar { op, input, scalar } => {
            let x = evaluate(input, bindings, memo)?;
            let s = *scalar;
            x.mapv(|v| op.apply(v, s))
        }
    };

    memo.insert(id, result.clone());
    Ok(result)
}

fn combine(op: BinaryOp, a: &HostArray, b: &HostArray) -> Result<HostArray> {
    let shape = broadcast_shapes(a.shape(), b.shape()).map_err(|e| ArrayCtxError::Backend {
        backend: BACKEND,
        op: op.name(),
        message: e.to_string(),
    })?;
    let lhs = a.broadcast(IxDyn(&shape)).ok_or_else(|| combine_error(op, a))?;
    let rhs = b.broadcast(IxDyn(&shape)).ok_or_else(|| combine_error(op, b))?;
    let mut out = ArrayD::zeros(IxDyn(&shape));
    Zip::from(&mut out)
        .and(&lhs)
        .and(&rhs)
        .for_each(|o, &x, &y| *o = op.apply(x, y));
    Ok(out)
}

fn combine_error(op: BinaryOp, operand: &HostArray) -> ArrayCtxError {
    ArrayCtxError::Backend {
        backend: BACKEND,
        op: op.name(),
        message: format!("cannot broadcast operand of shape {:?}", operand.shape()),
    }
}
