//! Graph mapper facade
//!
//! Owns the schema registry, the query executor and its session pool, and
//! the id generator. Cloning is cheap; clones share everything, and every
//! materialized entity holds one.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::MapperConfig;
use crate::driver::{Driver, Row};
use crate::entity::{materialize_vertex, take_node, Relation, Vertex};
use crate::error::{MapperError, Result};
use crate::id_gen::{CuidGenerator, IdGenerator};
use crate::query::cypher::{self, FindQuery, ID_PROPERTY};
use crate::query::Executor;
use crate::schema::{Registry, ShapeDef, VertexShape};
use crate::value::{PropertyMap, Value};

struct MapperInner {
    config: MapperConfig,
    registry: Registry,
    executor: Executor,
    id_gen: RwLock<Arc<dyn IdGenerator>>,
}

#[derive(Clone)]
pub struct GraphMapper {
    inner: Arc<MapperInner>,
}

impl fmt::Debug for GraphMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphMapper")
            .field("database", &self.inner.config.database)
            .field("shapes", &self.inner.registry.names())
            .finish()
    }
}

/// One or many property bags for [`GraphMapper::create`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch(Vec<PropertyMap>);

impl Batch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<PropertyMap> for Batch {
    fn from(bag: PropertyMap) -> Self {
        Batch(vec![bag])
    }
}

impl From<Vec<PropertyMap>> for Batch {
    fn from(bags: Vec<PropertyMap>) -> Self {
        Batch(bags)
    }
}

impl<const N: usize> From<[PropertyMap; N]> for Batch {
    fn from(bags: [PropertyMap; N]) -> Self {
        Batch(bags.into())
    }
}

/// Anything that names a node or edge by `$id`
pub trait HasId {
    fn entity_id(&self) -> &str;
}

impl HasId for Vertex {
    fn entity_id(&self) -> &str {
        self.id()
    }
}

impl HasId for Relation {
    fn entity_id(&self) -> &str {
        self.id()
    }
}

impl HasId for str {
    fn entity_id(&self) -> &str {
        self
    }
}

impl HasId for String {
    fn entity_id(&self) -> &str {
        self
    }
}

impl GraphMapper {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::with_config(driver, MapperConfig::default())
    }

    pub fn with_config(driver: impl Driver + 'static, config: MapperConfig) -> Self {
        Self::from_driver(Arc::new(driver), config)
    }

    pub fn from_driver(driver: Arc<dyn Driver>, config: MapperConfig) -> Self {
        tracing::info!(
            "Graph mapper on database {} (max idle sessions {}, {:?})",
            config.database,
            config.pool.max_idle,
            config.pool.policy
        );
        let executor = Executor::new(driver, &config);
        Self {
            inner: Arc::new(MapperInner {
                config,
                registry: Registry::new(),
                executor,
                id_gen: RwLock::new(Arc::new(CuidGenerator::new())),
            }),
        }
    }

    /// Replace the `$id` generator for everything created from now on
    pub fn with_id_generator(self, generator: impl IdGenerator + 'static) -> Self {
        *self.inner.id_gen.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(generator);
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    pub(crate) fn next_id(&self) -> String {
        let generator = self.inner.id_gen.read().unwrap_or_else(PoisonError::into_inner).clone();
        generator.next_id()
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Register a vertex type, replacing any earlier one of the same name
    pub fn define(&self, name: &str, def: impl Into<ShapeDef>) -> &Self {
        self.inner.registry.insert(VertexShape::new(name, def));
        self
    }

    pub fn shape(&self, name: &str) -> Result<Arc<VertexShape>> {
        self.inner.registry.get(name)
    }

    /// Registered type names, sorted
    pub fn shapes(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Run a raw parameterized statement
    pub async fn run(&self, statement: &str, params: &PropertyMap) -> Result<Vec<Row<Value>>> {
        self.inner.executor.run(statement, params).await
    }

    /// Delete every node and edge; requires the literal `DELETE ALL DATA`
    pub async fn reset(&self, confirmation: &str) -> Result<()> {
        self.inner.executor.reset(confirmation).await
    }

    /// Create vertices of a registered type, one per bag, in a single statement
    ///
    /// Each bag is stamped with a fresh `$id`. An empty batch sends nothing.
    pub async fn create(&self, type_name: &str, bags: impl Into<Batch>) -> Result<Vec<Vertex>> {
        let shape = self.shape(type_name)?;
        let Batch(bags) = bags.into();
        if bags.is_empty() {
            return Ok(Vec::new());
        }

        let stamped = bags
            .into_iter()
            .map(|mut bag| {
                bag.insert(ID_PROPERTY.to_string(), Value::from(self.next_id()));
                bag
            })
            .collect();

        let labels = shape.node_labels();
        let stmt = cypher::create_nodes(labels.as_slice(), stamped)?;
        let rows = self.inner.executor.execute(stmt).await?;
        self.materialize_rows(&shape, rows)
    }

    /// Vertices of a type matching the query, in query order
    pub async fn find(&self, type_name: &str, query: FindQuery) -> Result<Vec<Vertex>> {
        let shape = self.shape(type_name)?;
        let stmt = cypher::find(shape.name(), &query)?;
        let rows = self.inner.executor.execute(stmt).await?;
        self.materialize_rows(&shape, rows)
    }

    /// The vertex with the given `$id`, as the given type
    pub async fn fetch<E: HasId + ?Sized>(&self, entity: &E, type_name: &str) -> Result<Vertex> {
        let shape = self.shape(type_name)?;
        self.fetch_vertex(entity.entity_id(), Some(shape)).await
    }

    /// Close all pooled sessions; later operations fail with `PoolClosed`
    pub async fn close(&self) {
        self.inner.executor.close().await;
        tracing::info!("Graph mapper closed");
    }

    /// Fetch by `$id`; without a shape the type is inferred from the labels
    pub(crate) async fn fetch_vertex(&self, id: &str, shape: Option<Arc<VertexShape>>) -> Result<Vertex> {
        let mut rows = self.inner.executor.execute(cypher::fetch_node(id)).await?;
        let Some(row) = rows.first_mut() else {
            return Err(MapperError::not_found(id));
        };
        let node = take_node(row)?;
        let shape = match shape {
            Some(shape) => shape,
            None => self.inner.registry.resolve_labels(&node.labels)?,
        };
        materialize_vertex(self, shape, node)
    }

    fn materialize_rows(&self, shape: &Arc<VertexShape>, rows: Vec<Row<Value>>) -> Result<Vec<Vertex>> {
        rows.into_iter()
            .map(|mut row| materialize_vertex(self, Arc::clone(shape), take_node(&mut row)?))
            .collect()
    }
}
