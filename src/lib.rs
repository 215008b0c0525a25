//! vertexmap - schema-driven object mapper for property graphs
//!
//! # Architecture
//!
//! - **Schema registry**: vertex types with labels, property descriptors, and
//!   outgoing relation slots (one/many)
//! - **Synthetic ids**: every node and edge carries a `$id` string; identity
//!   lookups never use store-native ids
//! - **Value codec**: native values (timestamps, wide integers, nested
//!   lists/maps) to and from the store's wire values
//! - **Query executor**: parameterized statements over a pooled set of
//!   driver sessions, released on every path
//! - **Entities**: vertices with change-tracked property bags and
//!   relation accessors; relations with endpoint resolution
//!
//! # Usage example
//!
//! ```no_run
//! use vertexmap::{props, FindQuery, GraphMapper, MemoryDriver, RelationShape, ShapeDef, ValueDescriptor};
//!
//! # #[tokio::main]
//! # async fn main() -> vertexmap::Result<()> {
//! let db = GraphMapper::new(MemoryDriver::new());
//! db.define(
//!     "User",
//!     ShapeDef::new()
//!         .prop("name", ValueDescriptor::string())
//!         .prop("email", ValueDescriptor::string())
//!         .rel("FOLLOWS", RelationShape::many("User").prop("since", ValueDescriptor::timestamp())),
//! );
//!
//! let users = db
//!     .create("User", vec![props! { "name" => "A" }, props! { "name" => "B" }])
//!     .await?;
//! users[0]
//!     .rel("FOLLOWS")?
//!     .link(&users[1], props! { "since" => chrono::Utc::now() })
//!     .await?;
//!
//! let found = db.find("User", FindQuery::new().filter("name", "A")).await?;
//! println!("A follows {} users", found[0].rel("FOLLOWS")?.all().await?.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod id_gen;
pub mod mapper;
pub mod query;
pub mod schema;
pub mod value;

pub use config::{MapperConfig, PoolConfig, SelectionPolicy};
pub use driver::{Driver, MemoryDriver, OpaqueValue, Row, Session, WireMap, WireValue};
pub use entity::{PropertyBag, Related, Relation, RelationHandle, Vertex};
pub use error::{MapperError, Result};
pub use id_gen::{CuidGenerator, IdGenerator};
pub use mapper::{Batch, GraphMapper, HasId};
pub use query::{Direction, FindQuery, RESET_CONFIRMATION};
pub use schema::{Cardinality, Field, RelationShape, ShapeDef, ValueDescriptor, ValueKind, VertexShape};
pub use value::{EdgeValue, NodeValue, PropertyMap, Value};

#[cfg(feature = "bolt")]
pub use driver::bolt::BoltDriver;
