//! Query executor
//!
//! Runs one parameterized statement per call. Parameters go through the
//! codec before a session is taken, so a conversion failure never reaches
//! the store. The session goes back to the pool on every path.

pub mod cypher;
pub mod pool;

use std::sync::Arc;

use crate::config::MapperConfig;
use crate::driver::{Driver, Row};
use crate::error::{MapperError, Result};
use crate::value::{from_wire, map_to_wire, PropertyMap, Value};

pub use cypher::{Direction, FindQuery, Statement, RESET_CONFIRMATION};
pub use pool::{PooledSession, SessionPool};

pub struct Executor {
    pool: SessionPool,
}

impl Executor {
    pub fn new(driver: Arc<dyn Driver>, config: &MapperConfig) -> Self {
        Self {
            pool: SessionPool::new(driver, config.database.clone(), config.pool.clone()),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Run a statement and decode every cell to its native form
    pub async fn run(&self, statement: &str, params: &PropertyMap) -> Result<Vec<Row<Value>>> {
        let wire = map_to_wire(params)?;

        tracing::debug!(
            target: "vertexmap::query",
            "{} params={:?}",
            statement,
            wire.keys().collect::<Vec<_>>()
        );

        let mut session = self.pool.acquire().await?;
        let result = session.run(statement, wire).await;
        session.release(result.is_ok()).await;

        let rows = result?;
        tracing::trace!(target: "vertexmap::query", "{} rows", rows.len());

        rows.into_iter().map(|row| row.try_map(from_wire)).collect()
    }

    pub async fn execute(&self, statement: Statement) -> Result<Vec<Row<Value>>> {
        self.run(&statement.text, &statement.params).await
    }

    /// Delete every node and edge; `confirmation` must be the exact literal
    pub async fn reset(&self, confirmation: &str) -> Result<()> {
        if confirmation != RESET_CONFIRMATION {
            return Err(MapperError::ConfirmationRequired);
        }
        tracing::info!("Resetting database {}", self.pool.database());
        self.execute(cypher::reset()).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    fn executor(driver: &MemoryDriver) -> Executor {
        Executor::new(Arc::new(driver.clone()), &MapperConfig::default())
    }

    #[tokio::test]
    async fn test_run_decodes_rows() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);

        let stmt = cypher::create_nodes(
            &["User"],
            vec![crate::props! { "$id" => "a", "age" => 30, "born" => chrono::Utc::now() }],
        )
        .unwrap();
        let rows = exec.execute(stmt).await.unwrap();

        let node = rows[0].get("n").and_then(Value::as_node).unwrap();
        assert_eq!(node.properties["age"], Value::BigInt(30));
        assert!(node.properties["born"].as_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_conversion_failure_sends_nothing() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);

        let params = crate::props! { "id" => Value::BigInt(i128::MAX) };
        let err = exec
            .run("MATCH (n) WHERE n.`$id` = $id RETURN n", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Conversion(_)));
        assert_eq!(driver.statement_count(), 0);
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failure_releases_session() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);

        driver.fail_next("boom");
        let err = exec.execute(cypher::fetch_node("a")).await.unwrap_err();
        assert!(matches!(err, MapperError::Driver(ref m) if m == "boom"));
        assert_eq!(driver.open_sessions(), 0);

        // The pool still works afterwards
        assert!(exec.execute(cypher::fetch_node("a")).await.unwrap().is_empty());
        assert_eq!(exec.pool().idle_sessions(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_session_to_pool() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);

        driver.stall_next();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            exec.execute(cypher::fetch_node("a")),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(exec.pool().abandoned_sessions(), 1);
        assert_eq!(driver.open_sessions(), 1);

        assert!(exec.execute(cypher::fetch_node("a")).await.unwrap().is_empty());
        assert_eq!(exec.pool().abandoned_sessions(), 0);
        assert_eq!(driver.open_sessions(), 1);

        exec.close().await;
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_reset_guard() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);
        exec.execute(cypher::create_nodes(&["User"], vec![crate::props! { "$id" => "a" }]).unwrap())
            .await
            .unwrap();

        for bad in ["", "delete all data", "DELETE ALL DATA "] {
            assert!(matches!(exec.reset(bad).await, Err(MapperError::ConfirmationRequired)));
        }
        assert_eq!(driver.statement_count(), 1);
        assert_eq!(driver.node_count(), 1);

        exec.reset(RESET_CONFIRMATION).await.unwrap();
        assert_eq!(driver.node_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_executor_refuses() {
        let driver = MemoryDriver::new();
        let exec = executor(&driver);
        exec.close().await;
        assert!(matches!(
            exec.execute(cypher::fetch_node("a")).await,
            Err(MapperError::PoolClosed)
        ));
    }
}
