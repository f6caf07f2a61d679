use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::EntityKey;

/// A dynamically typed attribute value.
///
/// This is the currency of attribute interception: every read and write
/// callback receives and returns a `Value`. Typed access goes through
/// [`AttributeValue`].
///
/// Equality is structural. Floats compare by bit pattern so that `Value`
/// can be used as (part of) a hash key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Absent value (SQL `NULL`, unset field).
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// A to-one association, held by key.
    Reference(Box<EntityKey>),
    /// A to-many association or element collection.
    Collection(CollectionValue),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Reference(_) => "reference",
            Self::Collection(_) => "collection",
        }
    }

    /// The collection payload, if this is a collection value.
    pub fn as_collection(&self) -> Option<&CollectionValue> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Build a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Build a reference value.
    pub fn reference(key: EntityKey) -> Self {
        Self::Reference(Box::new(key))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Reference(k) => k.hash(state),
            Self::Collection(c) => c.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Reference(k) => write!(f, "{k}"),
            Self::Collection(c) => match c.len() {
                Some(n) => write!(f, "[{n} elements]"),
                None => write!(f, "[uninitialized]"),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A collection-valued attribute.
///
/// Collections carry their own laziness: a collection can be present on a
/// managed object while its elements are still unloaded. Such a collection
/// cannot be sized without a further load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionValue {
    elements: Vec<Value>,
    initialized: bool,
}

impl CollectionValue {
    /// A collection whose elements are loaded.
    pub fn loaded(elements: Vec<Value>) -> Self {
        Self {
            elements,
            initialized: true,
        }
    }

    /// A collection wrapper whose elements have not been fetched yet.
    pub fn uninitialized() -> Self {
        Self {
            elements: Vec::new(),
            initialized: false,
        }
    }

    /// Whether the elements have been loaded.
    pub fn was_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of elements, or `None` if the collection is not initialized.
    pub fn len(&self) -> Option<usize> {
        self.initialized.then_some(self.elements.len())
    }

    /// Returns `true` if the collection is initialized and empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// The loaded elements (empty when uninitialized).
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

/// Conversion between a Rust type and [`Value`].
///
/// Implemented for the primitive attribute types so that typed read/write
/// callbacks can all funnel through the same untyped handlers.
pub trait AttributeValue: Sized {
    /// Name used in mismatch errors.
    const TYPE_NAME: &'static str;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, TypeError>;
}

fn mismatch<T: AttributeValue>(found: &Value) -> TypeError {
    TypeError::Mismatch {
        expected: T::TYPE_NAME,
        found: found.type_name(),
    }
}

impl AttributeValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        Ok(value)
    }
}

impl AttributeValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for i32 {
    const TYPE_NAME: &'static str = "int32";

    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Int(i) => i32::try_from(i).map_err(|_| TypeError::OutOfRange {
                value: i,
                target: Self::TYPE_NAME,
            }),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Float(x) => Ok(x),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for String {
    const TYPE_NAME: &'static str = "text";

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn into_value(self) -> Value {
        Value::Bytes(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for EntityKey {
    const TYPE_NAME: &'static str = "reference";

    fn into_value(self) -> Value {
        Value::Reference(Box::new(self))
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Reference(k) => Ok(*k),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl AttributeValue for CollectionValue {
    const TYPE_NAME: &'static str = "collection";

    fn into_value(self) -> Value {
        Value::Collection(self)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Collection(c) => Ok(c),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: AttributeValue> AttributeValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn into_value(self) -> Value {
        self.map_or(Value::Null, AttributeValue::into_value)
    }

    fn from_value(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identifier;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn typed_conversions_accept_matching_variants() {
        assert!(bool::from_value(Value::Bool(true)).unwrap());
        assert_eq!(i64::from_value(Value::Int(7)).unwrap(), 7);
        assert_eq!(String::from_value(Value::text("x")).unwrap(), "x");
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::Int(3)).unwrap(), Some(3));
    }

    #[test]
    fn typed_conversion_reports_mismatch() {
        let err = i64::from_value(Value::text("seven")).unwrap_err();
        assert_eq!(
            err,
            TypeError::Mismatch {
                expected: "int",
                found: "text"
            }
        );
    }

    #[test]
    fn narrow_integer_rejects_overflow() {
        let err = i32::from_value(Value::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, TypeError::OutOfRange { .. }));
        assert_eq!(i32::from_value(Value::Int(-5)).unwrap(), -5);
    }

    #[test]
    fn uninitialized_collection_has_no_size() {
        let lazy = CollectionValue::uninitialized();
        assert!(!lazy.was_initialized());
        assert_eq!(lazy.len(), None);
        assert!(!lazy.is_empty());

        let loaded = CollectionValue::loaded(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(loaded.len(), Some(2));
    }

    #[test]
    fn floats_hash_consistently_with_equality() {
        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        assert!(set.contains(&Value::Float(1.5)));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn reference_display_uses_entity_key() {
        let key = EntityKey::new("Customer", Identifier::simple(Value::Int(9)));
        assert_eq!(Value::reference(key).to_string(), "Customer#9");
    }

    #[test]
    fn serde_keeps_variant() {
        let v = Value::Collection(CollectionValue::loaded(vec![Value::text("a")]));
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    proptest! {
        #[test]
        fn int_values_convert_back(i in any::<i64>()) {
            prop_assert_eq!(i64::from_value(i.into_value()).unwrap(), i);
        }
    }
}
