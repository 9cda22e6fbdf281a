#![forbid(unsafe_code)]

//! Dynamic values stored in a scope's property bag.
//!
//! # Design
//!
//! [`Value`] is a schemaless tree: primitives plus arrays and objects.
//! Containers are *shared handles* (`Rc<RefCell<..>>`): cloning a `Value`
//! clones the handle, not the contents. This is what lets application code
//! mutate an array in place and have a structural watcher notice on the next
//! digest, while an identity watcher (comparing by [`Rc::ptr_eq`]) stays
//! clean until the property is reassigned to a different container.
//!
//! Two equality relations exist, selected per watcher via [`Equality`]:
//!
//! - [`identity_eq`](Value::identity_eq): primitives by value, containers by
//!   handle identity.
//! - [`deep_eq`](Value::deep_eq): recursive structural comparison.
//!
//! Both treat `NaN` as equal to itself, overriding IEEE semantics; a watch
//! function persistently producing `NaN` must not stay dirty forever.
//!
//! # Invariants
//!
//! 1. `Value` trees are acyclic. `deep_eq` and `deep_clone` do not detect
//!    cycles; constructing a cyclic value through shared handles is a caller
//!    bug.
//! 2. `deep_clone` shares nothing with its source: every container in the
//!    result is a fresh handle.
//! 3. `identity_eq(a, b)` implies `deep_eq(a, b)`.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

/// Shared handle to an array of values.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared handle to a string-keyed object.
pub type ObjectRef = Rc<RefCell<AHashMap<String, Value>>>;

/// Comparison mode for a watcher, chosen at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Equality {
    /// Primitives by value, containers by handle identity (the default).
    #[default]
    Identity,
    /// Recursive structural comparison. Watchers in this mode snapshot a
    /// [`deep_clone`](Value::deep_clone) of the observed value so later
    /// in-place mutation is detected as a change.
    Structural,
}

/// A dynamic value: the unit of state watched and stored by a scope.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// An absent value. Reading an unset scope property yields `Undefined`;
    /// it is also a legal value for a watch function to produce.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// `NaN` compares equal to itself in both equality modes.
fn num_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl Value {
    /// Build an array value from anything yielding `Value`s.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Build an object value from key/value pairs.
    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Object(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Element at `index` if this is an array, else `Undefined`.
    #[must_use]
    pub fn index(&self, index: usize) -> Value {
        match self {
            Self::Array(a) => a.borrow().get(index).cloned().unwrap_or(Self::Undefined),
            _ => Self::Undefined,
        }
    }

    /// Entry under `key` if this is an object, else `Undefined`.
    #[must_use]
    pub fn key(&self, key: &str) -> Value {
        match self {
            Self::Object(o) => o.borrow().get(key).cloned().unwrap_or(Self::Undefined),
            _ => Self::Undefined,
        }
    }

    /// Reference/identity comparison.
    ///
    /// Primitives compare by value (`NaN == NaN` holds); arrays and objects
    /// compare by handle identity, so in-place mutation does not change the
    /// outcome but reassignment to a new container does.
    #[must_use]
    pub fn identity_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => num_eq(*a, *b),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Recursive structural comparison with the same `NaN` override at
    /// numeric leaves.
    #[must_use]
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Self::Object(a), Self::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.deep_eq(w)))
            }
            _ => self.identity_eq(other),
        }
    }

    /// Compare under the given mode.
    #[must_use]
    pub fn equals(&self, other: &Value, mode: Equality) -> bool {
        match mode {
            Equality::Identity => self.identity_eq(other),
            Equality::Structural => self.deep_eq(other),
        }
    }

    /// Structural copy: every container in the result is a fresh handle,
    /// sharing nothing with `self`.
    #[must_use]
    pub fn deep_clone(&self) -> Value {
        match self {
            Self::Array(a) => {
                Self::Array(Rc::new(RefCell::new(
                    a.borrow().iter().map(Value::deep_clone).collect(),
                )))
            }
            Self::Object(o) => Self::Object(Rc::new(RefCell::new(
                o.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            ))),
            other => other.clone(),
        }
    }
}

// Conversions for ergonomic `Scope::set` calls.

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::array(v)
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    //! Manual serde impls: the shared-handle containers rule out derives.
    //! `Undefined` serializes as null; deserialization never produces it.

    use std::cell::RefCell;
    use std::fmt;
    use std::rc::Rc;

    use ahash::AHashMap;
    use serde::de::{MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Value;

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Undefined | Value::Null => serializer.serialize_unit(),
                Value::Bool(b) => serializer.serialize_bool(*b),
                Value::Number(n) => serializer.serialize_f64(*n),
                Value::Str(s) => serializer.serialize_str(s),
                Value::Array(a) => {
                    let a = a.borrow();
                    let mut seq = serializer.serialize_seq(Some(a.len()))?;
                    for item in a.iter() {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Value::Object(o) => {
                    let o = o.borrow();
                    let mut map = serializer.serialize_map(Some(o.len()))?;
                    for (key, value) in o.iter() {
                        map.serialize_entry(key, value)?;
                    }
                    map.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("any dynamic value")
        }

        fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Value, E> {
            Ok(Value::Bool(v))
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Value, E> {
            Ok(Value::Number(v as f64))
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Value, E> {
            Ok(Value::Number(v as f64))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Value, E> {
            Ok(Value::Number(v))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Value, E> {
            Ok(Value::Str(v.to_owned()))
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Value, E> {
            Ok(Value::Str(v))
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
            Value::deserialize(deserializer)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(Value::array(items))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
            let mut entries = AHashMap::new();
            while let Some((key, value)) = map.next_entry::<String, Value>()? {
                entries.insert(key, value);
            }
            Ok(Value::Object(Rc::new(RefCell::new(entries))))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
