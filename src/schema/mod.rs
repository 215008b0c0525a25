//! Schema registry: vertex and relation shapes
//!
//! A vertex type is declared once with [`GraphMapper::define`] and stored
//! as an immutable [`VertexShape`]. Fields are split into properties and
//! relations by their [`Field`] variant, never by declaration order.
//! Re-defining a name replaces the previous shape.
//!
//! [`GraphMapper::define`]: crate::GraphMapper::define

pub mod descriptor;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::entity::RelationAccessor;
use crate::error::{MapperError, Result};
use crate::value::PropertyMap;

pub use descriptor::{ValueDescriptor, ValueKind};

/// How many peers a relation slot conceptually targets
///
/// Only the accessor's calling convention depends on this; the store may
/// hold any number of edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Outgoing relation slot on a vertex type
#[derive(Debug, Clone, PartialEq)]
pub struct RelationShape {
    cardinality: Cardinality,
    to: String,
    labels: Vec<String>,
    props: BTreeMap<String, ValueDescriptor>,
}

impl RelationShape {
    pub fn new(cardinality: Cardinality, to: impl Into<String>) -> Self {
        Self {
            cardinality,
            to: to.into(),
            labels: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    /// Relation to at most one peer
    pub fn one(to: impl Into<String>) -> Self {
        Self::new(Cardinality::One, to)
    }

    /// Relation to any number of peers
    pub fn many(to: impl Into<String>) -> Self {
        Self::new(Cardinality::Many, to)
    }

    /// Extra labels; kept as metadata since an edge carries a single type tag
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Declare an edge property
    pub fn prop(mut self, name: impl Into<String>, descriptor: ValueDescriptor) -> Self {
        self.props.insert(name.into(), descriptor);
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    /// Name of the target vertex type
    pub fn target(&self) -> &str {
        &self.to
    }

    pub fn label_names(&self) -> &[String] {
        &self.labels
    }

    pub fn props(&self) -> &BTreeMap<String, ValueDescriptor> {
        &self.props
    }

    /// Check an edge property bag against the declared edge properties
    ///
    /// A relation without declared properties takes any bag. Otherwise every
    /// declared property must validate and no other key may appear.
    pub fn validate(&self, props: &PropertyMap) -> Result<()> {
        if self.props.is_empty() {
            return Ok(());
        }
        for (name, descriptor) in &self.props {
            descriptor.validate(name, props.get(name))?;
        }
        match props.keys().find(|key| !self.props.contains_key(key.as_str())) {
            Some(key) => Err(MapperError::Validation {
                property: key.clone(),
                expected: "no value (not a declared edge property)".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// One entry of a vertex definition
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Prop(ValueDescriptor),
    Rel(RelationShape),
}

impl From<ValueDescriptor> for Field {
    fn from(d: ValueDescriptor) -> Self {
        Field::Prop(d)
    }
}

impl From<RelationShape> for Field {
    fn from(r: RelationShape) -> Self {
        Field::Rel(r)
    }
}

/// Body of a `define` call: labels plus fields
///
/// Converts from the accepted positional forms: `()` (name only), a label
/// list, a field list, or a `(labels, fields)` pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeDef {
    labels: Vec<String>,
    fields: Vec<(String, Field)>,
}

impl ShapeDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.fields.push((name.into(), field.into()));
        self
    }

    pub fn prop(self, name: impl Into<String>, descriptor: ValueDescriptor) -> Self {
        self.field(name, descriptor)
    }

    pub fn rel(self, name: impl Into<String>, relation: RelationShape) -> Self {
        self.field(name, relation)
    }
}

impl From<()> for ShapeDef {
    fn from(_: ()) -> Self {
        ShapeDef::default()
    }
}

impl<const N: usize> From<[&str; N]> for ShapeDef {
    fn from(labels: [&str; N]) -> Self {
        ShapeDef {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            fields: Vec::new(),
        }
    }
}

impl From<Vec<String>> for ShapeDef {
    fn from(labels: Vec<String>) -> Self {
        ShapeDef { labels, fields: Vec::new() }
    }
}

impl<const N: usize> From<[(&str, Field); N]> for ShapeDef {
    fn from(fields: [(&str, Field); N]) -> Self {
        ShapeDef {
            labels: Vec::new(),
            fields: fields.into_iter().map(|(k, f)| (k.to_string(), f)).collect(),
        }
    }
}

impl From<Vec<(String, Field)>> for ShapeDef {
    fn from(fields: Vec<(String, Field)>) -> Self {
        ShapeDef { labels: Vec::new(), fields }
    }
}

impl<const N: usize, const M: usize> From<([&str; N], [(&str, Field); M])> for ShapeDef {
    fn from((labels, fields): ([&str; N], [(&str, Field); M])) -> Self {
        let mut def = ShapeDef::from(fields);
        def.labels = labels.iter().map(|l| l.to_string()).collect();
        def
    }
}

/// Registered vertex type
#[derive(Debug)]
pub struct VertexShape {
    name: String,
    labels: Vec<String>,
    props: BTreeMap<String, ValueDescriptor>,
    rels: BTreeMap<String, RelationShape>,
    accessors: BTreeMap<String, Arc<RelationAccessor>>,
}

impl VertexShape {
    /// Classify the definition's fields and build the relation dispatch table
    pub fn new(name: impl Into<String>, def: impl Into<ShapeDef>) -> Self {
        let name = name.into();
        let def = def.into();

        let mut props = BTreeMap::new();
        let mut rels = BTreeMap::new();
        for (key, field) in def.fields {
            match field {
                Field::Prop(descriptor) => {
                    rels.remove(&key);
                    props.insert(key, descriptor);
                }
                Field::Rel(relation) => {
                    props.remove(&key);
                    rels.insert(key, relation);
                }
            }
        }

        let accessors = rels
            .iter()
            .map(|(rel, shape)| {
                let accessor = RelationAccessor::new(&name, rel, shape.clone());
                (rel.clone(), Arc::new(accessor))
            })
            .collect();

        Self {
            name,
            labels: def.labels,
            props,
            rels,
            accessors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Labels written on create: the type name, then the declared labels
    pub fn node_labels(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.labels.iter().map(String::as_str).filter(|l| *l != self.name))
            .collect()
    }

    pub fn props(&self) -> &BTreeMap<String, ValueDescriptor> {
        &self.props
    }

    pub fn rels(&self) -> &BTreeMap<String, RelationShape> {
        &self.rels
    }

    pub fn relation(&self, name: &str) -> Option<&RelationShape> {
        self.rels.get(name)
    }

    pub(crate) fn accessor(&self, name: &str) -> Result<Arc<RelationAccessor>> {
        self.accessors
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::UnknownRelation {
                shape: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// Check a property bag against the declared descriptors
    ///
    /// Undeclared properties are allowed.
    pub fn validate(&self, props: &PropertyMap) -> Result<()> {
        for (name, descriptor) in &self.props {
            descriptor.validate(name, props.get(name))?;
        }
        Ok(())
    }
}

/// Name → shape table shared by the mapper and its entities
#[derive(Debug, Default)]
pub struct Registry {
    shapes: RwLock<HashMap<String, Arc<VertexShape>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shape, replacing any previous shape of the same name
    pub fn insert(&self, shape: VertexShape) -> Arc<VertexShape> {
        let shape = Arc::new(shape);
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        if shapes.insert(shape.name().to_string(), Arc::clone(&shape)).is_some() {
            tracing::debug!("Replaced vertex shape {}", shape.name());
        }
        shape
    }

    pub fn get(&self, name: &str) -> Result<Arc<VertexShape>> {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::UnknownShape(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Pick the vertex type for a node: the first label naming a registered
    /// shape. Fails with `UnknownShape` naming the first label otherwise.
    pub fn resolve_labels(&self, labels: &[String]) -> Result<Arc<VertexShape>> {
        let shapes = self.shapes.read().unwrap_or_else(PoisonError::into_inner);
        labels
            .iter()
            .find_map(|label| shapes.get(label).cloned())
            .ok_or_else(|| {
                MapperError::UnknownShape(labels.first().cloned().unwrap_or_default())
            })
    }
}
