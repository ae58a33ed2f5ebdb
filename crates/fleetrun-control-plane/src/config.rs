//! Control plane configuration.

use std::str::FromStr;
use std::time::Duration;

use fleetrun_core::TaskId;

use crate::error::StatusError;
use crate::table::DEFAULT_TABLE_SHARDS;

/// First task id edge sites may synthesize while disconnected.
pub const DEFAULT_LOCAL_TASK_ID_START: i64 = 10_000_000_000;

/// Seconds an edge waits on one center before trying the next.
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;

/// Storage engine of the status store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StatusError::Configuration(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

/// Status store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage engine.
    pub backend: StorageBackend,

    /// Database file used by the SQLite backend.
    pub sqlite_path: String,

    /// Prefix of every table name.
    pub table_prefix: String,

    /// Number of task host tables.
    pub table_shards: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: "fleetrun.db".to_string(),
            table_prefix: String::new(),
            table_shards: DEFAULT_TABLE_SHARDS,
        }
    }
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// True for the center, which owns the status store.
    pub authoritative: bool,

    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Center base URLs, tried in order by edge sites.
    pub center_api: Vec<String>,

    /// Connect and request timeout against each center (seconds).
    pub forward_timeout_secs: u64,

    /// Status store configuration (center only).
    pub storage: StorageConfig,

    /// Task ids at or above this value were synthesized locally and are never
    /// replayed to the center.
    pub local_task_id_start: TaskId,

    /// Interval between result buffer replays (seconds).
    pub replay_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authoritative: true,
            http_bind_addr: "[::1]:50080".to_string(),
            center_api: Vec::new(),
            forward_timeout_secs: DEFAULT_FORWARD_TIMEOUT_SECS,
            storage: StorageConfig::default(),
            local_task_id_start: TaskId::new(DEFAULT_LOCAL_TASK_ID_START),
            replay_interval_secs: 5,
        }
    }
}

impl Config {
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    /// Reject combinations the process cannot start with.
    pub fn validate(&self) -> Result<(), StatusError> {
        if !self.authoritative && self.center_api.is_empty() {
            return Err(StatusError::Configuration(
                "edge sites need at least one center API address".to_string(),
            ));
        }
        if self.storage.table_shards == 0 {
            return Err(StatusError::Configuration(
                "table shard count must be positive".to_string(),
            ));
        }
        if self.forward_timeout_secs == 0 {
            return Err(StatusError::Configuration(
                "forward timeout must be positive".to_string(),
            ));
        }
        if self.replay_interval_secs == 0 {
            return Err(StatusError::Configuration(
                "replay interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_backend() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(" SQLite ".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);

        let err = "mysql".parse::<StorageBackend>().unwrap_err();
        assert!(matches!(err, StatusError::Configuration(_)));
    }

    #[test]
    fn test_default_config_is_valid_center() {
        let config = Config::default();
        assert!(config.authoritative);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_edge_without_center_is_rejected() {
        let config = Config {
            authoritative: false,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(StatusError::Configuration(_))));

        let config = Config {
            authoritative: false,
            center_api: vec!["http://center:50080".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_forward_timeout_is_rejected() {
        let config = Config {
            forward_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(StatusError::Configuration(_))));
        assert_eq!(Config::default().forward_timeout(), Duration::from_secs(10));
    }
}
