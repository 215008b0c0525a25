//! Native property values
//!
//! `Value` is what callers read from and write into entity property bags.
//! The store's own value system lives in [`crate::driver::WireValue`]; the
//! [`codec`] module converts between the two.

pub mod codec;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::driver::OpaqueValue;

pub use codec::{from_wire, map_from_wire, map_to_wire, to_wire};

/// Property bag keyed by property name
pub type PropertyMap = BTreeMap<String, Value>;

/// Native value carried by vertex and relation properties
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Double-precision number
    Number(f64),
    /// Arbitrary-width integer; the store keeps 64 bits
    BigInt(i128),
    String(String),
    /// Calendar timestamp (UTC instant)
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(PropertyMap),
    /// Node cell returned by a statement
    Node(NodeValue),
    /// Relationship cell returned by a statement
    Relationship(EdgeValue),
    /// Store value without a native form; written back as it was read
    Opaque(OpaqueValue),
}

/// Node as seen by the mapper: labels plus native properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeValue {
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

/// Relationship as seen by the mapper: type tag plus native properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeValue {
    pub rel_type: String,
    pub properties: PropertyMap,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; integers are widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::BigInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|i| i64::try_from(i).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeValue> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeValue> {
        match self {
            Value::Relationship(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            Value::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "integer",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Relationship(_) => "relationship",
            Value::Opaque(_) => "opaque",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(f64::from(n))
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(i: $t) -> Self {
                    Value::BigInt(i128::from(i))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<PropertyMap> for Value {
    fn from(map: PropertyMap) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::BigInt(i128::from(i)),
                None => match n.as_u64() {
                    Some(u) => Value::BigInt(i128::from(u)),
                    None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
                },
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Map(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

/// Build a [`PropertyMap`] from `key => value` pairs
///
/// ```
/// use vertexmap::{props, Value};
///
/// let bag = props! { "name" => "Jacob", "age" => 30 };
/// assert_eq!(bag.get("name"), Some(&Value::from("Jacob")));
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::PropertyMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::PropertyMap::new();
        $(
            map.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        map
    }};
}
