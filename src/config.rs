//! Mapper configuration
//!
//! Loaded from a JSON file, from `VERTEXMAP_*` environment variables, or
//! built in code. Every field has a default, so an empty JSON object is a
//! valid configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};

pub const ENV_DATABASE: &str = "VERTEXMAP_DATABASE";
pub const ENV_POOL_MAX_IDLE: &str = "VERTEXMAP_POOL_MAX_IDLE";
pub const ENV_POOL_POLICY: &str = "VERTEXMAP_POOL_POLICY";

/// Which idle session a statement reuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Rotate through idle sessions
    #[default]
    RoundRobin,
    /// Take the session that has been idle longest
    LeastRecentlyUsed,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(SelectionPolicy::RoundRobin),
            "least_recently_used" | "lru" => Ok(SelectionPolicy::LeastRecentlyUsed),
            other => Err(MapperError::Config(format!("unknown pool policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle sessions kept open between statements; 0 closes each session
    /// right after its statement
    pub max_idle: usize,
    pub policy: SelectionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 1,
            policy: SelectionPolicy::RoundRobin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Database name passed to the driver when opening sessions
    pub database: String,
    pub pool: PoolConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            database: "neo4j".to_string(),
            pool: PoolConfig::default(),
        }
    }
}

impl MapperConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Defaults overridden by any `VERTEXMAP_*` variables that are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(database) = lookup(ENV_DATABASE) {
            config.database = database;
        }
        if let Some(max_idle) = lookup(ENV_POOL_MAX_IDLE) {
            config.pool.max_idle = max_idle.trim().parse().map_err(|_| {
                MapperError::Config(format!("{} must be a non-negative integer, got '{}'", ENV_POOL_MAX_IDLE, max_idle))
            })?;
        }
        if let Some(policy) = lookup(ENV_POOL_POLICY) {
            config.pool.policy = policy.parse()?;
        }
        Ok(config)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert_eq!(config.database, "neo4j");
        assert_eq!(config.pool.max_idle, 1);
        assert_eq!(config.pool.policy, SelectionPolicy::RoundRobin);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"database": "graph", "pool": {{"policy": "least_recently_used"}}}}"#).unwrap();

        let config = MapperConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.database, "graph");
        assert_eq!(config.pool.max_idle, 1);
        assert_eq!(config.pool.policy, SelectionPolicy::LeastRecentlyUsed);
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MapperConfig::from_json_file(dir.path().join("missing.json")),
            Err(MapperError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            MapperConfig::from_json_file(file.path()),
            Err(MapperError::Json(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_DATABASE, "people"),
            (ENV_POOL_MAX_IDLE, "4"),
            (ENV_POOL_POLICY, "LRU"),
        ]
        .into_iter()
        .collect();
        let config = MapperConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database, "people");
        assert_eq!(config.pool.max_idle, 4);
        assert_eq!(config.pool.policy, SelectionPolicy::LeastRecentlyUsed);

        let bad = MapperConfig::from_lookup(|k| (k == ENV_POOL_MAX_IDLE).then(|| "-1".to_string()));
        assert!(matches!(bad, Err(MapperError::Config(_))));
    }

    #[test]
    fn test_builders() {
        let config = MapperConfig::default()
            .with_database("other")
            .with_pool(PoolConfig { max_idle: 0, ..PoolConfig::default() });
        assert_eq!(config.database, "other");
        assert_eq!(config.pool.max_idle, 0);
    }
}
