//! Relation entity

use std::fmt;

use crate::error::{MapperError, Result};
use crate::mapper::GraphMapper;
use crate::query::cypher;
use crate::value::{PropertyMap, Value};

use super::{take_relation, Vertex};

/// Materialized edge: flat property bag plus endpoint ids
#[derive(Clone)]
pub struct Relation {
    mapper: GraphMapper,
    rel_type: String,
    id: String,
    from: String,
    to: String,
    props: PropertyMap,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("type", &self.rel_type)
            .field("id", &self.id)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("props", &self.props)
            .finish()
    }
}

impl Relation {
    pub(crate) fn new(
        mapper: GraphMapper,
        rel_type: String,
        id: String,
        from: String,
        to: String,
        props: PropertyMap,
    ) -> Self {
        Self { mapper, rel_type, id, from, to, props }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Edge type, which is the relation name on the source vertex type
    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn from_id(&self) -> &str {
        &self.from
    }

    pub fn to_id(&self) -> &str {
        &self.to
    }

    pub fn props(&self) -> &PropertyMap {
        &self.props
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Fetch the edge again by `$id`
    pub async fn refetch(&self) -> Result<Relation> {
        self.single(cypher::fetch_relation(&self.id)).await
    }

    /// Overlay `props` on the current properties and write the result
    pub async fn update(&self, props: PropertyMap) -> Result<Relation> {
        let stmt = cypher::update_relation(&self.id, props, Some(self.props.clone()));
        self.single(stmt).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.mapper.executor().execute(cypher::delete_relation(&self.id)).await?;
        Ok(())
    }

    /// Source vertex, typed by its labels
    pub async fn from_vertex(&self) -> Result<Vertex> {
        self.mapper.fetch_vertex(&self.from, None).await
    }

    /// Target vertex, typed by its labels
    pub async fn to_vertex(&self) -> Result<Vertex> {
        self.mapper.fetch_vertex(&self.to, None).await
    }

    async fn single(&self, stmt: cypher::Statement) -> Result<Relation> {
        let rows = self.mapper.executor().execute(stmt).await?;
        match rows.into_iter().next() {
            Some(row) => take_relation(&self.mapper, row),
            None => Err(MapperError::not_found(&self.id)),
        }
    }
}
