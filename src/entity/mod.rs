//! Entity materializer
//!
//! Turns result rows into live entities. A node cell becomes a [`Vertex`]
//! whose `$id` is lifted out of the property bag; an edge cell plus its
//! endpoint ids becomes a [`Relation`].

pub mod relation;
pub mod vertex;

use std::sync::Arc;

use crate::driver::Row;
use crate::error::{MapperError, Result};
use crate::mapper::GraphMapper;
use crate::query::cypher::{FROM_COLUMN, ID_PROPERTY, NODE_COLUMN, REL_COLUMN, TO_COLUMN};
use crate::schema::VertexShape;
use crate::value::{EdgeValue, NodeValue, PropertyMap, Value};

pub use relation::Relation;
pub use vertex::{Related, RelationAccessor, RelationHandle, Vertex};

// ============================================================================
// Property Bag
// ============================================================================

/// Property map plus a sync flag
///
/// Every write clears the flag; reads never touch it. The flag is set
/// again only by the owning entity after a successful pull or push.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBag {
    values: PropertyMap,
    synced: bool,
}

impl PropertyBag {
    /// A bag that mirrors the store
    pub fn new(values: PropertyMap) -> Self {
        Self { values, synced: true }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &PropertyMap {
        &self.values
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.synced = false;
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.synced = false;
        self.values.remove(key)
    }

    /// Mutable access to one value; counts as a write even if unused
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.synced = false;
        self.values.get_mut(key)
    }

    pub fn extend(&mut self, values: PropertyMap) {
        self.synced = false;
        self.values.extend(values);
    }

    pub(crate) fn mark(&mut self, synced: bool) {
        self.synced = synced;
    }

    /// Replace every value with the store's copy
    pub(crate) fn replace(&mut self, values: PropertyMap) {
        self.values = values;
        self.synced = true;
    }
}

impl From<PropertyMap> for PropertyBag {
    fn from(values: PropertyMap) -> Self {
        Self::new(values)
    }
}

// ============================================================================
// Materialization
// ============================================================================

/// Remove `$id` from a property map
pub(crate) fn split_id(props: &mut PropertyMap) -> Result<String> {
    match props.remove(ID_PROPERTY) {
        Some(Value::String(id)) => Ok(id),
        Some(_) => Err(MapperError::UnexpectedCell {
            column: ID_PROPERTY.to_string(),
            expected: "string",
        }),
        None => Err(MapperError::MissingColumn(ID_PROPERTY.to_string())),
    }
}

pub(crate) fn materialize_vertex(
    mapper: &GraphMapper,
    shape: Arc<VertexShape>,
    mut node: NodeValue,
) -> Result<Vertex> {
    let id = split_id(&mut node.properties)?;
    Ok(Vertex::new(mapper.clone(), shape, id, node.labels, node.properties))
}

pub(crate) fn materialize_relation(
    mapper: &GraphMapper,
    mut edge: EdgeValue,
    from: String,
    to: String,
) -> Result<Relation> {
    let id = split_id(&mut edge.properties)?;
    Ok(Relation::new(mapper.clone(), edge.rel_type, id, from, to, edge.properties))
}

fn take_cell(row: &mut Row<Value>, column: &str) -> Result<Value> {
    row.take(column)
        .ok_or_else(|| MapperError::MissingColumn(column.to_string()))
}

fn take_string(row: &mut Row<Value>, column: &str) -> Result<String> {
    match take_cell(row, column)? {
        Value::String(s) => Ok(s),
        _ => Err(MapperError::UnexpectedCell {
            column: column.to_string(),
            expected: "string",
        }),
    }
}

/// The node cell of a node-returning statement
pub(crate) fn take_node(row: &mut Row<Value>) -> Result<NodeValue> {
    match take_cell(row, NODE_COLUMN)? {
        Value::Node(node) => Ok(node),
        _ => Err(MapperError::UnexpectedCell {
            column: NODE_COLUMN.to_string(),
            expected: "node",
        }),
    }
}

/// Edge cell and endpoint ids of a relation-returning statement
pub(crate) fn take_relation(mapper: &GraphMapper, mut row: Row<Value>) -> Result<Relation> {
    let edge = match take_cell(&mut row, REL_COLUMN)? {
        Value::Relationship(edge) => edge,
        _ => {
            return Err(MapperError::UnexpectedCell {
                column: REL_COLUMN.to_string(),
                expected: "relationship",
            })
        }
    };
    let from = take_string(&mut row, FROM_COLUMN)?;
    let to = take_string(&mut row, TO_COLUMN)?;
    materialize_relation(mapper, edge, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    #[test]
    fn test_bag_reads_keep_sync() {
        let bag = PropertyBag::new(props! { "name" => "Jacob" });
        assert!(bag.is_synced());
        assert_eq!(bag.get("name"), Some(&Value::from("Jacob")));
        assert!(bag.contains_key("name"));
        assert_eq!(bag.iter().count(), 1);
        assert!(bag.is_synced());
    }

    #[test]
    fn test_bag_writes_clear_sync() {
        let mut bag = PropertyBag::new(props! { "name" => "Jacob" });
        bag.set("name", "Jake");
        assert!(!bag.is_synced());

        let mut bag = PropertyBag::new(props! { "name" => "Jacob" });
        bag.remove("name");
        assert!(!bag.is_synced());

        let mut bag = PropertyBag::new(props! { "tags" => vec!["a"] });
        if let Some(Value::List(tags)) = bag.get_mut("tags") {
            tags.push(Value::from("b"));
        }
        assert!(!bag.is_synced());
        assert_eq!(bag.get("tags"), Some(&Value::from(vec!["a", "b"])));

        let mut bag = PropertyBag::new(PropertyMap::new());
        bag.extend(props! { "x" => 1 });
        assert!(!bag.is_synced());

        bag.replace(props! { "y" => 2 });
        assert!(bag.is_synced());
        assert!(!bag.contains_key("x"));
    }

    #[test]
    fn test_split_id() {
        let mut props = props! { "$id" => "c1", "name" => "x" };
        assert_eq!(split_id(&mut props).unwrap(), "c1");
        assert!(!props.contains_key("$id"));

        assert!(matches!(split_id(&mut props), Err(MapperError::MissingColumn(_))));

        let mut bad = props! { "$id" => 5 };
        assert!(matches!(split_id(&mut bad), Err(MapperError::UnexpectedCell { .. })));
    }

    #[test]
    fn test_take_node_rejects_wrong_cell() {
        let mut row = Row::new().with("n", Value::from("not a node"));
        assert!(matches!(take_node(&mut row), Err(MapperError::UnexpectedCell { .. })));

        let mut empty: Row<Value> = Row::new();
        assert!(matches!(take_node(&mut empty), Err(MapperError::MissingColumn(_))));
    }
}
