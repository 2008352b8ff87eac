//! Generic recursive traversal over array containers
//!
//! All operations recurse until a non-container leaf is reached, rebuild the
//! exact input shape, and never mutate their inputs. Scalar leaves are
//! pass-through: they are enumerated but never handed to leaf functions.
//!
//! `map_leaves` memoizes by node identity within a single call: a leaf or
//! subtree reachable via two paths is transformed once, and the output
//! preserves the sharing. The memo table is built fresh per call and
//! discarded, so mutated inputs can never observe stale results.

use crate::array::ArrayRef;
use crate::container::{Key, Path, Value};
use crate::context::{ArrayContext, BinaryOp, UnaryOp};
use crate::error::{ArrayCtxError, Result};
use crate::registry;
use std::collections::HashMap;

/// Enumerate every leaf of a container as `(path, leaf)` pairs.
///
/// The order is deterministic and stable across calls: children are visited
/// in their descriptor's enumeration order, depth first. Shared subtrees are
/// listed once per path. Scalar leaves are included.
pub fn enumerate_leaves(value: &Value) -> Result<Vec<(Path, Value)>> {
    let mut leaves = Vec::new();
    let mut path = Vec::new();
    rec_enumerate(value, &mut path, &mut leaves)?;
    Ok(leaves)
}

fn rec_enumerate(value: &Value, path: &mut Path, leaves: &mut Vec<(Path, Value)>) -> Result<()> {
    match value {
        Value::Array(_) | Value::Scalar(_) => {
            leaves.push((path.clone(), value.clone()));
            Ok(())
        }
        Value::Container(c) => {
            let descriptor = registry::required_descriptor(c)?;
            for (key, child) in descriptor.enumerate(c)? {
                path.push(key);
                rec_enumerate(&child, path, leaves)?;
                path.pop();
            }
            Ok(())
        }
    }
}

/// Rebuild a container from replacement leaves.
///
/// `new_leaves` must have exactly the count and order that
/// [`enumerate_leaves`] produces for `container`; a count mismatch errors
/// with `ShapeMismatch`.
pub fn reconstruct(container: &Value, new_leaves: Vec<Value>) -> Result<Value> {
    let expected = new_leaves.len();
    let mut leaves = new_leaves.into_iter();
    let rebuilt = rec_reconstruct(container, &mut leaves)?;
    let unused = leaves.count();
    if unused != 0 {
        return Err(ArrayCtxError::ShapeMismatch(format!(
            "reconstruction used {} leaves but {} were supplied",
            expected - unused,
            expected
        )));
    }
    Ok(rebuilt)
}

fn rec_reconstruct(value: &Value, leaves: &mut std::vec::IntoIter<Value>) -> Result<Value> {
    match value {
        Value::Array(_) | Value::Scalar(_) => leaves.next().ok_or_else(|| {
            ArrayCtxError::ShapeMismatch("ran out of replacement leaves during reconstruction".into())
        }),
        Value::Container(c) => {
            let descriptor = registry::required_descriptor(c)?;
            let children = descriptor.enumerate(c)?;
            let mut rebuilt = Vec::with_capacity(children.len());
            for (_, child) in &children {
                rebuilt.push(rec_reconstruct(child, leaves)?);
            }
            descriptor.reconstruct(c, rebuilt)
        }
    }
}

/// Apply `f` to every leaf array and rebuild the same container shape.
///
/// `f` is invoked exactly once per unique leaf identity; positions that
/// shared an array on input share the transformed array on output. This is a
/// guarantee, not a hint: backends may have side effects per invocation.
pub fn map_leaves<F>(mut f: F, value: &Value) -> Result<Value>
where
    F: FnMut(&ArrayRef) -> Result<ArrayRef>,
{
    let mut memo: HashMap<usize, Value> = HashMap::new();
    rec_map(&mut f, value, &mut memo)
}

fn rec_map<F>(f: &mut F, value: &Value, memo: &mut HashMap<usize, Value>) -> Result<Value>
where
    F: FnMut(&ArrayRef) -> Result<ArrayRef>,
{
    let identity = value.node_identity();
    if let Some(id) = identity {
        if let Some(hit) = memo.get(&id) {
            return Ok(hit.clone());
        }
    }

    let result = match value {
        Value::Array(a) => Value::Array(f(a)?),
        Value::Scalar(s) => Value::Scalar(*s),
        Value::Container(c) => {
            let descriptor = registry::required_descriptor(c)?;
            let children = descriptor.enumerate(c)?;
            let mut rebuilt = Vec::with_capacity(children.len());
            for (_, child) in &children {
                rebuilt.push(rec_map(f, child, memo)?);
            }
            descriptor.reconstruct(c, rebuilt)?
        }
    };

    if let Some(id) = identity {
        memo.insert(id, result.clone());
    }
    Ok(result)
}

/// Path-aware variant of [`map_leaves`]: `f` receives the key path from the
/// root alongside the leaf.
///
/// Not memoized: a shared leaf is visited once per path, because each visit
/// carries a distinct path.
pub fn map_leaves_with_path<F>(mut f: F, value: &Value) -> Result<Value>
where
    F: FnMut(&[Key], &ArrayRef) -> Result<ArrayRef>,
{
    let mut path = Vec::new();
    rec_map_with_path(&mut f, value, &mut path)
}

fn rec_map_with_path<F>(f: &mut F, value: &Value, path: &mut Path) -> Result<Value>
where
    F: FnMut(&[Key], &ArrayRef) -> Result<ArrayRef>,
{
    match value {
        Value::Array(a) => Ok(Value::Array(f(path, a)?)),
        Value::Scalar(s) => Ok(Value::Scalar(*s)),
        Value::Container(c) => {
            let descriptor = registry::required_descriptor(c)?;
            let children = descriptor.enumerate(c)?;
            let mut rebuilt = Vec::with_capacity(children.len());
            for (key, child) in &children {
                path.push(key.clone());
                rebuilt.push(rec_map_with_path(f, child, path)?);
                path.pop();
            }
            descriptor.reconstruct(c, rebuilt)
        }
    }
}

/// Apply `f` across the corresponding leaves of several shape-congruent
/// containers, rebuilding the shared shape.
///
/// All inputs must have the same container type and key set at every level;
/// any divergence errors with `ShapeMismatch`. There is no broadcasting
/// across container shape — leaf-level numeric broadcasting stays with the
/// backend.
pub fn multimap_leaves<F>(mut f: F, values: &[&Value]) -> Result<Value>
where
    F: FnMut(&[&ArrayRef]) -> Result<ArrayRef>,
{
    if values.is_empty() {
        return Err(ArrayCtxError::ShapeMismatch(
            "multimap requires at least one container".into(),
        ));
    }
    rec_multimap(&mut f, values)
}

fn rec_multimap<F>(f: &mut F, values: &[&Value]) -> Result<Value>
where
    F: FnMut(&[&ArrayRef]) -> Result<ArrayRef>,
{
    match values[0] {
        Value::Array(_) => {
            let mut arrays = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Array(a) => arrays.push(a),
                    _ => return Err(congruence_error(values)),
                }
            }
            Ok(Value::Array(f(&arrays)?))
        }
        Value::Scalar(s) => {
            if values.iter().any(|v| v.as_scalar().is_none()) {
                return Err(congruence_error(values));
            }
            Ok(Value::Scalar(*s))
        }
        Value::Container(first) => {
            let descriptor = registry::required_descriptor(first)?;
            let first_children = descriptor.enumerate(first)?;
            let keys: Vec<&Key> = first_children.iter().map(|(k, _)| k).collect();

            // Children of every input, position-aligned with the first's keys
            let mut columns: Vec<Vec<Value>> = Vec::with_capacity(values.len());
            for value in values {
                let container = match value {
                    Value::Container(c) if c.as_ref().type_id() == first.as_ref().type_id() => c,
                    _ => return Err(congruence_error(values)),
                };
                let children = descriptor.enumerate(container)?;
                if children.len() != keys.len()
                    || children.iter().zip(&keys).any(|((k, _), want)| k != *want)
                {
                    return Err(ArrayCtxError::ShapeMismatch(format!(
                        "containers are not congruent: key sets differ \
                         ({:?} vs {:?})",
                        keys,
                        children.iter().map(|(k, _)| k).collect::<Vec<_>>()
                    )));
                }
                columns.push(children.into_iter().map(|(_, child)| child).collect());
            }

            let mut rebuilt = Vec::with_capacity(keys.len());
            for position in 0..keys.len() {
                let row: Vec<&Value> = columns.iter().map(|col| &col[position]).collect();
                rebuilt.push(rec_multimap(f, &row)?);
            }
            descriptor.reconstruct(first, rebuilt)
        }
    }
}

fn congruence_error(values: &[&Value]) -> ArrayCtxError {
    let kinds: Vec<&'static str> = values
        .iter()
        .map(|v| match v {
            Value::Array(_) => "array",
            Value::Scalar(_) => "scalar",
            Value::Container(c) => registry::descriptor_of(c)
                .map(|d| d.type_name())
                .unwrap_or("<unregistered>"),
        })
        .collect();
    ArrayCtxError::ShapeMismatch(format!(
        "containers are not congruent: mismatched node kinds {kinds:?}"
    ))
}

/// Left-to-right fold over the leaf arrays of a container, in enumeration
/// order. Scalar leaves are skipped; shared leaves are folded once per path.
pub fn reduce_leaves<T, F>(mut f: F, value: &Value, initial: T) -> Result<T>
where
    F: FnMut(T, &ArrayRef) -> Result<T>,
{
    let mut accumulator = initial;
    for (_, leaf) in enumerate_leaves(value)? {
        if let Value::Array(a) = leaf {
            accumulator = f(accumulator, &a)?;
        }
    }
    Ok(accumulator)
}

// ============================================================================
// Context-coupled conveniences
// ============================================================================

/// Apply one elementwise unary operation to every leaf of a container
pub fn map_unary(ctx: &dyn ArrayContext, op: UnaryOp, value: &Value) -> Result<Value> {
    map_leaves(|a| ctx.unary(op, a), value)
}

/// Combine two shape-congruent containers leafwise with one binary operation
pub fn map_binary(ctx: &dyn ArrayContext, op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    multimap_leaves(|leaves| ctx.binary(op, leaves[0], leaves[1]), &[a, b])
}

/// Combine every leaf of a container with a scalar constant
pub fn map_scalar(ctx: &dyn ArrayContext, op: BinaryOp, value: &Value, scalar: f64) -> Result<Value> {
    map_leaves(|a| ctx.binary_scalar(op, a, scalar), value)
}
