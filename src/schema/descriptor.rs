//! Value descriptors for declared properties
//!
//! A descriptor states the kind a property holds. The registry only reads
//! the kind; [`ValueDescriptor::validate`] is available to callers who want
//! to check a bag before writing it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};
use crate::value::Value;

/// Declared kind of a property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Integer,
    Timestamp,
    ArrayOf(Box<ValueKind>),
}

impl ValueKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::String, Value::String(_)) => true,
            // Integers are numbers too
            (ValueKind::Number, Value::Number(_) | Value::BigInt(_)) => true,
            (ValueKind::Boolean, Value::Bool(_)) => true,
            (ValueKind::Integer, Value::BigInt(_)) => true,
            (ValueKind::Timestamp, Value::Timestamp(_)) => true,
            (ValueKind::ArrayOf(inner), Value::List(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Number => write!(f, "number"),
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Timestamp => write!(f, "timestamp"),
            ValueKind::ArrayOf(inner) => write!(f, "array<{}>", inner),
        }
    }
}

/// Property declaration: a kind plus whether the value may be absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDescriptor {
    kind: ValueKind,
    #[serde(default)]
    optional: bool,
}

impl ValueDescriptor {
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, optional: false }
    }

    pub fn string() -> Self {
        Self::new(ValueKind::String)
    }

    pub fn number() -> Self {
        Self::new(ValueKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(ValueKind::Boolean)
    }

    pub fn integer() -> Self {
        Self::new(ValueKind::Integer)
    }

    pub fn timestamp() -> Self {
        Self::new(ValueKind::Timestamp)
    }

    pub fn array_of(item: ValueDescriptor) -> Self {
        Self::new(ValueKind::ArrayOf(Box::new(item.kind)))
    }

    /// Allow the property to be missing or null
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Check one property value; `None` means the property is absent
    pub fn validate(&self, property: &str, value: Option<&Value>) -> Result<()> {
        match value {
            None | Some(Value::Null) if self.optional => Ok(()),
            Some(v) if self.kind.accepts(v) => Ok(()),
            _ => Err(MapperError::Validation {
                property: property.to_string(),
                expected: self.kind.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_kind_accepts() {
        assert!(ValueKind::String.accepts(&Value::from("x")));
        assert!(!ValueKind::String.accepts(&Value::from(1)));
        assert!(ValueKind::Number.accepts(&Value::from(1.5)));
        assert!(ValueKind::Number.accepts(&Value::from(3)));
        assert!(!ValueKind::Integer.accepts(&Value::from(1.5)));
        assert!(ValueKind::Timestamp.accepts(&Value::from(Utc::now())));
    }

    #[test]
    fn test_array_kind() {
        let tags = ValueDescriptor::array_of(ValueDescriptor::string());
        assert_eq!(tags.kind().to_string(), "array<string>");
        assert!(tags.validate("tags", Some(&Value::from(vec!["a", "b"]))).is_ok());
        assert!(tags.validate("tags", Some(&Value::from(vec![1, 2]))).is_err());
        assert!(tags.validate("tags", Some(&Value::List(vec![]))).is_ok());
    }

    #[test]
    fn test_optional() {
        let required = ValueDescriptor::string();
        assert!(required.validate("name", None).is_err());
        assert!(required.validate("name", Some(&Value::Null)).is_err());

        let optional = ValueDescriptor::string().optional();
        assert!(optional.is_optional());
        assert!(optional.validate("name", None).is_ok());
        assert!(optional.validate("name", Some(&Value::Null)).is_ok());
        assert!(optional.validate("name", Some(&Value::from(1))).is_err());
    }

    #[test]
    fn test_validation_error_names_property() {
        let err = ValueDescriptor::integer()
            .validate("size", Some(&Value::from("big")))
            .unwrap_err();
        match err {
            MapperError::Validation { property, expected } => {
                assert_eq!(property, "size");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
