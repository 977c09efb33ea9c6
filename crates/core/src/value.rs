//! The value model fed to the content hasher

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A hashable value tree
///
/// Containers keep the concrete type that produced them (`List` vs `Tuple`)
/// so the hasher can optionally mix that type into the digest.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer wide enough for every `i64` and `u64`
    Int(i128),
    /// Double precision float
    Float(f64),
    /// UTF-8 text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Mutable ordered sequence
    List(Vec<Value>),
    /// Fixed ordered sequence
    Tuple(Vec<Value>),
    /// Unordered collection; duplicates collapse when hashed
    Set(Vec<Value>),
    /// Key/value pairs; entry order never affects the digest
    Map(Vec<(Value, Value)>),
    /// Custom type resolved through the extension registry
    Object(Object),
}

/// Structural classification of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Null, bool, int, float, str, bytes
    Primitive,
    /// List or tuple
    Sequence,
    /// Map
    Mapping,
    /// Set
    Set,
    /// Registered custom type
    Extension,
}

impl Value {
    /// Build a list from anything convertible to values
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a tuple from anything convertible to values
    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Build a set from anything convertible to values
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a map from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap raw bytes
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Wrap a custom value for registry lookup
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Object::new(value))
    }

    /// Structural kind of this node
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Bytes(_) => Kind::Primitive,
            Self::List(_) | Self::Tuple(_) => Kind::Sequence,
            Self::Map(_) => Kind::Mapping,
            Self::Set(_) => Kind::Set,
            Self::Object(_) => Kind::Extension,
        }
    }

    /// Short name of the concrete type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Map(_) => "dict",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// Borrow the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload as a float, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON document
    ///
    /// Integral numbers become [`Value::Int`], everything else numeric
    /// becomes [`Value::Float`]; objects become maps with string keys.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i128::from(i))
                } else if let Some(u) = n.as_u64() {
                    Self::Int(i128::from(u))
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Self::Str(s),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (Self::Str(k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert any serde-serializable value by way of JSON
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::from_json)
    }
}

/// Type-erased custom value
///
/// Equality is identity: two objects compare equal only when they share the
/// same allocation.
#[derive(Clone)]
pub struct Object {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Object {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// `TypeId` of the wrapped value
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the wrapped value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the wrapped value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub(crate) fn as_any(&self) -> &dyn Any {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.type_name)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(i128::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Self::Int(v as i128)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i128)
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

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::list(v)
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Self::map(v)
    }
}

impl<K: Into<Value>, V: Into<Value>, S> From<HashMap<K, V, S>> for Value {
    fn from(v: HashMap<K, V, S>) -> Self {
        Self::map(v)
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(v: BTreeSet<T>) -> Self {
        Self::set(v)
    }
}

impl<T: Into<Value>, S> From<HashSet<T, S>> for Value {
    fn from(v: HashSet<T, S>) -> Self {
        Self::set(v)
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self {
        Self::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Value {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Value::from(3).kind(), Kind::Primitive);
        assert_eq!(Value::list([1, 2]).kind(), Kind::Sequence);
        assert_eq!(Value::tuple([1, 2]).kind(), Kind::Sequence);
        assert_eq!(Value::set([1, 2]).kind(), Kind::Set);
        assert_eq!(Value::map([("a", 1)]).kind(), Kind::Mapping);
        assert_eq!(Value::object(5u8).kind(), Kind::Extension);
    }

    #[test]
    fn test_from_json_numbers() {
        let value = Value::from_json(serde_json::json!({"a": 1, "b": 1.5, "c": u64::MAX}));
        let Value::Map(entries) = value else {
            panic!("expected a map");
        };
        assert!(entries.contains(&(Value::from("a"), Value::Int(1))));
        assert!(entries.contains(&(Value::from("b"), Value::Float(1.5))));
        assert!(entries.contains(&(Value::from("c"), Value::Int(i128::from(u64::MAX)))));
    }

    #[test]
    fn test_from_serialize_struct() {
        #[derive(Serialize)]
        struct Config {
            name: &'static str,
            layers: Vec<u32>,
        }

        let value = Value::from_serialize(&Config {
            name: "resnet",
            layers: vec![3, 4, 6],
        })
        .unwrap();
        assert_eq!(value.kind(), Kind::Mapping);
    }

    #[test]
    fn test_object_identity_equality() {
        let a = Object::new(String::from("x"));
        let b = a.clone();
        let c = Object::new(String::from("x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<String>().map(String::as_str), Some("x"));
        assert!(a.type_name().contains("String"));
    }

    #[test]
    fn test_option_converts_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(4)), Value::Int(4));
    }
}
