//! Vertex entity and relation dispatch

use std::fmt;
use std::sync::Arc;

use crate::error::{MapperError, Result};
use crate::mapper::GraphMapper;
use crate::query::cypher::{self, ID_PROPERTY};
use crate::schema::{RelationShape, VertexShape};
use crate::value::{PropertyMap, Value};

use super::{take_node, take_relation, PropertyBag, Relation};

/// Live node of a registered vertex type
///
/// The entity owns its property bag. Writes through [`Vertex::set`] or
/// [`Vertex::props_mut`] mark it unsynced until the next [`Vertex::push`]
/// or [`Vertex::pull`]. After [`Vertex::delete`] the handle is a tombstone.
#[derive(Clone)]
pub struct Vertex {
    mapper: GraphMapper,
    shape: Arc<VertexShape>,
    id: String,
    labels: Vec<String>,
    props: PropertyBag,
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("type", &self.shape.name())
            .field("id", &self.id)
            .field("labels", &self.labels)
            .field("props", &self.props)
            .finish()
    }
}

impl Vertex {
    pub(crate) fn new(
        mapper: GraphMapper,
        shape: Arc<VertexShape>,
        id: String,
        labels: Vec<String>,
        props: PropertyMap,
    ) -> Self {
        Self {
            mapper,
            shape,
            id,
            labels,
            props: PropertyBag::new(props),
        }
    }

    /// Synthetic `$id`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registered vertex type name
    pub fn type_name(&self) -> &str {
        self.shape.name()
    }

    pub fn shape(&self) -> &Arc<VertexShape> {
        &self.shape
    }

    /// Labels as last returned by the store
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn props(&self) -> &PropertyBag {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut PropertyBag {
        &mut self.props
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.props.set(key, value)
    }

    pub fn is_synced(&self) -> bool {
        self.props.is_synced()
    }

    /// Accessor for a declared relation
    pub fn rel(&self, name: &str) -> Result<RelationHandle<'_>> {
        Ok(RelationHandle {
            vertex: self,
            accessor: self.shape.accessor(name)?,
        })
    }

    /// Replace labels and properties with the store's copy, dropping local edits
    pub async fn pull(&mut self) -> Result<()> {
        let mut rows = self.mapper.executor().execute(cypher::fetch_node(&self.id)).await?;
        let Some(row) = rows.first_mut() else {
            return Err(MapperError::not_found(&self.id));
        };
        let node = take_node(row)?;
        self.apply(node.labels, node.properties);
        Ok(())
    }

    /// Overwrite the stored properties with the local bag
    ///
    /// On failure the entity stays unsynced and the store is unchanged.
    pub async fn push(&mut self) -> Result<()> {
        let stmt = cypher::update_node(&self.id, self.props.as_map().clone(), None);
        let mut rows = self.mapper.executor().execute(stmt).await?;
        let Some(row) = rows.first_mut() else {
            return Err(MapperError::not_found(&self.id));
        };
        let node = take_node(row)?;
        self.apply(node.labels, node.properties);
        Ok(())
    }

    /// Delete the node and its incident edges; the entity becomes a tombstone
    pub async fn delete(&mut self) -> Result<()> {
        self.mapper.executor().execute(cypher::delete_node(&self.id)).await?;
        self.props.mark(false);
        Ok(())
    }

    /// A fresh entity for the same `$id`; the receiver is left as is
    pub async fn refetch(&self) -> Result<Vertex> {
        self.mapper.fetch_vertex(&self.id, Some(Arc::clone(&self.shape))).await
    }

    fn apply(&mut self, labels: Vec<String>, mut props: PropertyMap) {
        props.remove(ID_PROPERTY);
        self.labels = labels;
        self.props.replace(props);
    }
}

// ============================================================================
// Relation Dispatch
// ============================================================================

/// Traversal result, shaped by how the accessor was called
#[derive(Debug, Clone)]
pub enum Related {
    /// No target on a `many` relation: every outgoing edge
    Many(Vec<Relation>),
    /// No target on a `one` relation: the edge, if any
    One(Option<Relation>),
    /// Called with a target: the edge just created
    Linked(Relation),
}

impl Related {
    pub fn into_relations(self) -> Vec<Relation> {
        match self {
            Related::Many(all) => all,
            Related::One(one) => one.into_iter().collect(),
            Related::Linked(rel) => vec![rel],
        }
    }
}

/// Per-relation behavior, built once when a vertex type is registered
#[derive(Debug)]
pub struct RelationAccessor {
    source: String,
    name: String,
    shape: RelationShape,
}

impl RelationAccessor {
    pub(crate) fn new(source: &str, name: &str, shape: RelationShape) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
            shape,
        }
    }

    /// Relation name, also the edge type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning vertex type
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shape(&self) -> &RelationShape {
        &self.shape
    }

    /// Dual-mode entry point: traverse without a target, link with one
    pub async fn call(&self, vertex: &Vertex, target: Option<(&Vertex, PropertyMap)>) -> Result<Related> {
        match target {
            Some((target, props)) => Ok(Related::Linked(self.link(vertex, target, props).await?)),
            None if self.shape.is_many() => Ok(Related::Many(self.outgoing(vertex).await?)),
            None => Ok(Related::One(self.single(vertex).await?)),
        }
    }

    async fn outgoing(&self, vertex: &Vertex) -> Result<Vec<Relation>> {
        let stmt = cypher::outgoing(&self.name, vertex.id())?;
        let rows = vertex.mapper.executor().execute(stmt).await?;
        rows.into_iter()
            .map(|row| take_relation(&vertex.mapper, row))
            .collect()
    }

    async fn single(&self, vertex: &Vertex) -> Result<Option<Relation>> {
        let mut all = self.outgoing(vertex).await?;
        match all.len() {
            0 | 1 => Ok(all.pop()),
            found => Err(MapperError::AmbiguousRelation {
                relation: self.name.clone(),
                found,
            }),
        }
    }

    async fn link(&self, vertex: &Vertex, target: &Vertex, props: PropertyMap) -> Result<Relation> {
        if target.type_name() != self.shape.target() {
            return Err(MapperError::TargetMismatch {
                relation: self.name.clone(),
                expected: self.shape.target().to_string(),
                actual: target.type_name().to_string(),
            });
        }
        self.shape.validate(&props)?;

        let mut data = props;
        data.insert(ID_PROPERTY.to_string(), Value::from(vertex.mapper.next_id()));

        let stmt = cypher::link(&self.name, vertex.id(), target.id(), data)?;
        let rows = vertex.mapper.executor().execute(stmt).await?;
        match rows.into_iter().next() {
            Some(row) => take_relation(&vertex.mapper, row),
            None => Err(MapperError::not_found(format!("{} -> {}", vertex.id(), target.id()))),
        }
    }
}

/// A relation accessor bound to one vertex
pub struct RelationHandle<'a> {
    vertex: &'a Vertex,
    accessor: Arc<RelationAccessor>,
}

impl<'a> RelationHandle<'a> {
    pub fn accessor(&self) -> &RelationAccessor {
        &self.accessor
    }

    /// Cardinality-driven traversal
    pub async fn get(&self) -> Result<Related> {
        self.accessor.call(self.vertex, None).await
    }

    /// Every outgoing edge of this type, whatever the declared cardinality
    pub async fn all(&self) -> Result<Vec<Relation>> {
        self.accessor.outgoing(self.vertex).await
    }

    /// The single outgoing edge; more than one is an error
    pub async fn one(&self) -> Result<Option<Relation>> {
        self.accessor.single(self.vertex).await
    }

    /// Create an edge to `target` carrying `props`
    ///
    /// `props` must match the declared edge properties, if any.
    pub async fn link(&self, target: &Vertex, props: PropertyMap) -> Result<Relation> {
        self.accessor.link(self.vertex, target, props).await
    }

    /// Link without edge properties; fails with `Validation` when the
    /// relation declares a required one
    pub async fn link_to(&self, target: &Vertex) -> Result<Relation> {
        self.link(target, PropertyMap::new()).await
    }
}
