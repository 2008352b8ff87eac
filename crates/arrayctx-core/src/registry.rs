//! Process-wide registry of container type descriptors
//!
//! The registry is additive-only: entries are installed once, at type
//! definition time, and never removed. Re-registering a type is an error,
//! never a silent overwrite. Reads are lock-shared and always safe against
//! concurrent registration of other types.

use crate::container::{ContainerRef, Key, Value, ValueMap, ValueSeq};
use crate::error::{ArrayCtxError, Result};
use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::debug;

type EnumerateFn = dyn Fn(&ContainerRef) -> Result<Vec<(Key, Value)>> + Send + Sync;
type ReconstructFn = dyn Fn(&ContainerRef, Vec<Value>) -> Result<Value> + Send + Sync;

/// Capability descriptor for one container type
pub struct ContainerDescriptor {
    type_name: &'static str,
    enumerate: Box<EnumerateFn>,
    reconstruct: Box<ReconstructFn>,
}

impl ContainerDescriptor {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Enumerate `(key, child)` pairs in the type's fixed deterministic order
    pub fn enumerate(&self, container: &ContainerRef) -> Result<Vec<(Key, Value)>> {
        (self.enumerate)(container)
    }

    /// Rebuild a same-shape container from replacement children.
    /// The children must match the enumeration count and order.
    pub fn reconstruct(&self, container: &ContainerRef, children: Vec<Value>) -> Result<Value> {
        (self.reconstruct)(container, children)
    }
}

static REGISTRY: LazyLock<RwLock<HashMap<TypeId, Arc<ContainerDescriptor>>>> =
    LazyLock::new(|| {
        let mut registry = HashMap::new();
        registry.insert(TypeId::of::<ValueMap>(), Arc::new(map_descriptor()));
        registry.insert(TypeId::of::<ValueSeq>(), Arc::new(seq_descriptor()));
        RwLock::new(registry)
    });

/// Register a container type with its enumeration and reconstruction
/// functions. Errors with `DuplicateRegistration` if the type already has a
/// descriptor.
pub fn register<T, E, R>(type_name: &'static str, enumerate: E, reconstruct: R) -> Result<()>
where
    T: Any + Send + Sync,
    E: Fn(&T) -> Vec<(Key, Value)> + Send + Sync + 'static,
    R: Fn(&T, Vec<Value>) -> Result<T> + Send + Sync + 'static,
{
    let descriptor = ContainerDescriptor {
        type_name,
        enumerate: Box::new(move |container| {
            let concrete = downcast::<T>(container, type_name)?;
            Ok(enumerate(concrete))
        }),
        reconstruct: Box::new(move |container, children| {
            let concrete = downcast::<T>(container, type_name)?;
            Ok(Value::container(reconstruct(concrete, children)?))
        }),
    };

    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    match registry.entry(TypeId::of::<T>()) {
        Entry::Occupied(_) => Err(ArrayCtxError::DuplicateRegistration { type_name }),
        Entry::Vacant(slot) => {
            debug!(type_name, "registered container type");
            slot.insert(Arc::new(descriptor));
            Ok(())
        }
    }
}

/// Look up the descriptor for a container value, if its type is registered
pub fn descriptor_of(container: &ContainerRef) -> Option<Arc<ContainerDescriptor>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.get(&container.as_ref().type_id()).cloned()
}

/// Whether a value participates in container traversal.
///
/// Raw arrays count as trivial single-leaf containers; scalars do not;
/// container nodes count only if their concrete type is registered.
pub fn is_container(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Scalar(_) => false,
        Value::Container(c) => descriptor_of(c).is_some(),
    }
}

pub(crate) fn required_descriptor(container: &ContainerRef) -> Result<Arc<ContainerDescriptor>> {
    descriptor_of(container).ok_or_else(|| {
        ArrayCtxError::ShapeMismatch(
            "encountered a container of unregistered type; register a descriptor first".into(),
        )
    })
}

fn downcast<'a, T: Any + Send + Sync>(
    container: &'a ContainerRef,
    type_name: &'static str,
) -> Result<&'a T> {
    container.downcast_ref::<T>().ok_or_else(|| {
        ArrayCtxError::ShapeMismatch(format!("container value is not a {type_name}"))
    })
}

// ============================================================================
// Built-in descriptors
// ============================================================================

fn map_descriptor() -> ContainerDescriptor {
    ContainerDescriptor {
        type_name: "ValueMap",
        enumerate: Box::new(|container| {
            let map = downcast::<ValueMap>(container, "ValueMap")?;
            Ok(map
                .sorted_entries()
                .into_iter()
                .map(|(key, value)| (Key::Field(key.clone()), value.clone()))
                .collect())
        }),
        reconstruct: Box::new(|container, children| {
            let map = downcast::<ValueMap>(container, "ValueMap")?;
            if children.len() != map.len() {
                return Err(ArrayCtxError::ShapeMismatch(format!(
                    "ValueMap expects {} children, got {}",
                    map.len(),
                    children.len()
                )));
            }
            let rebuilt: ValueMap = map
                .sorted_entries()
                .into_iter()
                .zip(children)
                .map(|((key, _), child)| (key.clone(), child))
                .collect();
            Ok(Value::container(rebuilt))
        }),
    }
}

fn seq_descriptor() -> ContainerDescriptor {
    ContainerDescriptor {
        type_name: "ValueSeq",
        enumerate: Box::new(|container| {
            let seq = downcast::<ValueSeq>(container, "ValueSeq")?;
            Ok(seq
                .iter()
                .enumerate()
                .map(|(i, value)| (Key::Index(i), value.clone()))
                .collect())
        }),
        reconstruct: Box::new(|container, children| {
            let seq = downcast::<ValueSeq>(container, "ValueSeq")?;
            if children.len() != seq.len() {
                return Err(ArrayCtxError::ShapeMismatch(format!(
                    "ValueSeq expects {} children, got {}",
                    seq.len(),
                    children.len()
                )));
            }
            Ok(Value::container(ValueSeq::from(children)))
        }),
    }
}
