//! Array containers: nested aggregate values with array leaves
//!
//! A container is any registered composite whose leaves are arrays (or
//! pass-through scalars). The built-in kinds are [`ValueMap`] (mapping-like)
//! and [`ValueSeq`] (sequence-like); user record types join in via
//! [`crate::record_container!`] or a hand-written descriptor.

use crate::array::ArrayRef;
use crate::error::{ArrayCtxError, Result};
use crate::registry;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One step in a path from a container root to a leaf
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Named field of a record- or mapping-like container
    Field(String),
    /// Position in a sequence-like container
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Key sequence from a container root down to a leaf
pub type Path = Vec<Key>;

/// Opaque shared reference to a registered container value
pub type ContainerRef = Arc<dyn Any + Send + Sync>;

/// A node in a container tree.
///
/// `Scalar` leaves are pass-through: traversal enumerates them but never
/// hands them to leaf functions, and they are copied unchanged into outputs.
#[derive(Clone)]
pub enum Value {
    /// Leaf array (a trivial single-leaf container in its own right)
    Array(ArrayRef),
    /// Plain numeric constant, not subject to backend dispatch
    Scalar(f64),
    /// Nested container of a registered type
    Container(ContainerRef),
}

impl Value {
    /// Wrap a registered container type into a tree node
    pub fn container<T: Any + Send + Sync>(value: T) -> Self {
        Value::Container(Arc::new(value))
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Downcast a container node to its concrete type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Container(c) => c.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Identity of the shared allocation behind this node, if it has one.
    /// Scalars are plain values and have no identity.
    pub(crate) fn node_identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.identity()),
            Value::Scalar(_) => None,
            Value::Container(c) => Some(Arc::as_ptr(c) as *const () as usize),
        }
    }
}

impl From<ArrayRef> for Value {
    fn from(array: ArrayRef) -> Self {
        Value::Array(array)
    }
}

impl From<f64> for Value {
    fn from(scalar: f64) -> Self {
        Value::Scalar(scalar)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array(a) => {
                write!(f, "Array(shape={:?}, dtype={})", a.shape(), a.dtype())
            }
            Value::Scalar(s) => write!(f, "Scalar({s})"),
            Value::Container(c) => match registry::descriptor_of(c) {
                Some(descriptor) => {
                    let mut tree = f.debug_struct(descriptor.type_name());
                    match descriptor.enumerate(c) {
                        Ok(children) => {
                            for (key, child) in &children {
                                tree.field(&key.to_string(), child);
                            }
                            tree.finish()
                        }
                        Err(_) => tree.finish_non_exhaustive(),
                    }
                }
                None => write!(f, "<unregistered container>"),
            },
        }
    }
}

// ============================================================================
// Built-in containers
// ============================================================================

/// Immutable mapping-like container.
///
/// Enumerates its entries in sorted key order, so two structurally equal maps
/// always enumerate identically regardless of insertion order.
#[derive(Clone, Default)]
pub struct ValueMap {
    entries: IndexMap<String, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Entries in sorted key order, as enumerated by the registry descriptor
    pub fn sorted_entries(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Ordered sequence-like container
#[derive(Clone, Default)]
pub struct ValueSeq {
    items: Vec<Value>,
}

impl ValueSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }
}

impl From<Vec<Value>> for ValueSeq {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl FromIterator<Value> for ValueSeq {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Record field conversion
// ============================================================================

/// Conversion between record struct fields and container tree nodes.
///
/// Implemented for array handles, scalars, tree nodes, and the built-in
/// containers; [`crate::record_container!`] emits an implementation for each
/// registered record type so records can nest.
pub trait ContainerField: Sized {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

impl ContainerField for ArrayRef {
    fn to_value(&self) -> Value {
        Value::Array(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_array()
            .cloned()
            .ok_or_else(|| ArrayCtxError::ShapeMismatch("expected an array leaf".into()))
    }
}

impl ContainerField for f64 {
    fn to_value(&self) -> Value {
        Value::Scalar(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_scalar()
            .ok_or_else(|| ArrayCtxError::ShapeMismatch("expected a scalar leaf".into()))
    }
}

impl ContainerField for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl ContainerField for ValueMap {
    fn to_value(&self) -> Value {
        Value::container(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .downcast::<ValueMap>()
            .cloned()
            .ok_or_else(|| ArrayCtxError::ShapeMismatch("expected a ValueMap container".into()))
    }
}

impl ContainerField for ValueSeq {
    fn to_value(&self) -> Value {
        Value::container(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .downcast::<ValueSeq>()
            .cloned()
            .ok_or_else(|| ArrayCtxError::ShapeMismatch("expected a ValueSeq container".into()))
    }
}

/// Declares a `Clone` record struct as an array container.
///
/// Emits a [`ContainerField`] implementation (so the record can nest inside
/// other containers) and a `register()` associated function that installs the
/// container descriptor. Fields are enumerated in declaration order and each
/// field type must implement [`ContainerField`].
///
/// ```ignore
/// #[derive(Clone)]
/// struct State {
///     pos: ArrayRef,
///     vel: ArrayRef,
/// }
/// record_container!(State { pos, vel });
/// State::register()?;
/// ```
#[macro_export]
macro_rules! record_container {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::container::ContainerField for $ty {
            fn to_value(&self) -> $crate::container::Value {
                $crate::container::Value::container(self.clone())
            }

            fn from_value(value: $crate::container::Value) -> $crate::error::Result<Self> {
                value.downcast::<$ty>().cloned().ok_or_else(|| {
                    $crate::error::ArrayCtxError::ShapeMismatch(format!(
                        "expected a {} container",
                        stringify!($ty)
                    ))
                })
            }
        }

        impl $ty {
            /// Installs the container descriptor for this record type.
            /// Call once, before the first traversal that sees it.
            pub fn register() -> $crate::error::Result<()> {
                $crate::registry::register::<$ty, _, _>(
                    stringify!($ty),
                    |record: &$ty| {
                        vec![$(
                            (
                                $crate::container::Key::Field(stringify!($field).to_string()),
                                $crate::container::ContainerField::to_value(&record.$field),
                            ),
                        )+]
                    },
                    |_record: &$ty, children: ::std::vec::Vec<$crate::container::Value>| {
                        const FIELD_COUNT: usize = [$(stringify!($field)),+].len();
                        if children.len() != FIELD_COUNT {
                            return Err($crate::error::ArrayCtxError::ShapeMismatch(format!(
                                "{} expects {} children, got {}",
                                stringify!($ty),
                                FIELD_COUNT,
                                children.len()
                            )));
                        }
                        let mut children = children.into_iter();
                        let mut take = || {
                            children.next().ok_or_else(|| {
                                $crate::error::ArrayCtxError::ShapeMismatch(format!(
                                    "{} ran out of children during reconstruction",
                                    stringify!($ty)
                                ))
                            })
                        };
                        Ok($ty {
                            $($field: $crate::container::ContainerField::from_value(take()?)?,)+
                        })
                    },
                )
            }
        }
    };
}
