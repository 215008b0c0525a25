//! Driver/session boundary
//!
//! The mapper talks to a store through two narrow traits:
//!
//! - [`Driver`] opens sessions against a named database
//! - [`Session`] runs one statement with a parameter map and returns rows
//!
//! Values crossing this boundary are [`WireValue`]s, the store's own value
//! system. Store-native identity of nodes and edges is never exposed; the
//! mapper addresses everything through the reserved `$id` property.

pub mod memory;
pub mod statement;

#[cfg(feature = "bolt")]
pub mod bolt;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryDriver;

/// Parameter or property map in wire form
pub type WireMap = BTreeMap<String, WireValue>;

// ============================================================================
// Wire Value Types
// ============================================================================

/// Value as understood by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(WireDateTime),
    List(Vec<WireValue>),
    Map(WireMap),
    Node(WireNode),
    Relationship(WireEdge),
    /// Store value with no native counterpart, carried through untouched
    #[serde(skip)]
    Opaque(OpaqueValue),
}

/// Zoned timestamp: `seconds` since the Unix epoch (UTC), sub-second
/// `nanoseconds`, and the zone offset the value was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDateTime {
    pub seconds: i64,
    pub nanoseconds: u32,
    pub offset_seconds: i32,
}

/// A store value the mapper does not model (dates without a zone,
/// durations, points, byte arrays, ...)
///
/// The driver that produced it keeps its own representation in the payload
/// and can recover it with [`OpaqueValue::downcast_ref`] when the value is
/// written back. Equality compares the type name and the debug rendering.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: String,
    repr: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new<T>(type_name: impl Into<String>, payload: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            type_name: type_name.into(),
            repr: format!("{:?}", payload),
            payload: Arc::new(payload),
        }
    }

    /// Store type name, as reported by the driver
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn repr(&self) -> &str {
        &self.repr
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueValue({}: {})", self.type_name, self.repr)
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.repr == other.repr
    }
}

/// Node cell: labels plus properties
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireNode {
    pub labels: Vec<String>,
    pub properties: WireMap,
}

/// Relationship cell: type tag plus properties
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireEdge {
    pub rel_type: String,
    pub properties: WireMap,
}

impl WireValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl From<i64> for WireValue {
    fn from(i: i64) -> Self {
        WireValue::Integer(i)
    }
}

// ============================================================================
// Result Rows
// ============================================================================

/// One result record: named columns in statement order
#[derive(Debug, Clone, PartialEq)]
pub struct Row<V = WireValue> {
    columns: Vec<(String, V)>,
}

impl<V> Default for Row<V> {
    fn default() -> Self {
        Row { columns: Vec::new() }
    }
}

impl<V> Row<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: V) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: V) {
        self.columns.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&V> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Remove a column and return its value
    pub fn take(&mut self, column: &str) -> Option<V> {
        let idx = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert every cell, failing on the first conversion error
    pub fn try_map<U, F>(self, mut f: F) -> Result<Row<U>>
    where
        F: FnMut(V) -> Result<U>,
    {
        let columns = self
            .columns
            .into_iter()
            .map(|(name, value)| f(value).map(|v| (name, v)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row { columns })
    }
}

impl<V> IntoIterator for Row<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

// ============================================================================
// Driver Traits
// ============================================================================

/// Entry point of a store connection
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a session against `database`
    async fn open_session(&self, database: &str) -> Result<Box<dyn Session>>;
}

/// A live session; used by one statement at a time
#[async_trait]
pub trait Session: Send {
    /// Run a statement and collect all result rows
    async fn run(&mut self, statement: &str, params: WireMap) -> Result<Vec<Row>>;

    /// Close the session, releasing its connection
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_and_take() {
        let mut row = Row::new()
            .with("r", WireValue::Null)
            .with("from", WireValue::from("a"))
            .with("to", WireValue::from("b"));

        assert_eq!(row.len(), 3);
        assert_eq!(row.get("from"), Some(&WireValue::from("a")));
        assert_eq!(row.take("to"), Some(WireValue::from("b")));
        assert_eq!(row.get("to"), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["r", "from"]);
    }

    #[test]
    fn test_opaque_value_keeps_payload() {
        let opaque = OpaqueValue::new("Duration", std::time::Duration::from_secs(90));
        assert_eq!(opaque.type_name(), "Duration");
        assert_eq!(opaque.repr(), "90s");
        assert_eq!(
            opaque.downcast_ref::<std::time::Duration>(),
            Some(&std::time::Duration::from_secs(90))
        );
        assert!(opaque.downcast_ref::<String>().is_none());

        let same = OpaqueValue::new("Duration", std::time::Duration::from_secs(90));
        assert_eq!(WireValue::Opaque(opaque), WireValue::Opaque(same));
    }

    #[test]
    fn test_row_try_map_stops_on_error() {
        let row = Row::new()
            .with("a", WireValue::Integer(1))
            .with("b", WireValue::Null);

        let mapped = row.clone().try_map(|v| Ok(v.is_null())).unwrap();
        assert_eq!(mapped.get("b"), Some(&true));

        let failed = row.try_map(|v| match v {
            WireValue::Null => Err(crate::MapperError::Conversion("null".into())),
            other => Ok(other),
        });
        assert!(failed.is_err());
    }
}
