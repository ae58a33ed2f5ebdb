//! Storage port for task host records and doing markers.
//!
//! Backends implement [`StatusStore`]. Every multi-row change goes through a
//! [`UnitOfWork`]: an optional guard followed by ordered writes, applied
//! atomically. A guard that does not hold rejects the whole unit without
//! writing anything, which is how stale completion reports are detected.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use fleetrun_core::{host_key, DoingMarker, HostStatus, TaskHost, TaskId};

use crate::config::{StorageBackend, StorageConfig};
use crate::table::TableResolver;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate task host {key} in {table}")]
    Duplicate { table: String, key: String },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Failure reported by the storage engine.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row filter for listing the hosts of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilter {
    /// Only rows in one of these statuses. `None` keeps every row.
    pub statuses: Option<Vec<HostStatus>>,

    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl HostFilter {
    /// Every row of the task.
    pub fn all() -> Self {
        Self::default()
    }

    /// Rows in one of `statuses`.
    pub fn with_statuses(statuses: &[HostStatus]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            limit: None,
        }
    }

    /// Builder method to cap the number of rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if `record` passes the status filter.
    pub fn matches(&self, record: &TaskHost) -> bool {
        self.statuses
            .as_ref()
            .map_or(true, |statuses| statuses.contains(&record.status))
    }
}

/// Condition checked inside the unit before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The doing marker of (id, host) carries exactly `clock`.
    DoingClock { id: TaskId, host: String, clock: i64 },

    /// The stored record of (id, host) is in `status`.
    Status {
        table: String,
        id: TaskId,
        host: String,
        status: HostStatus,
    },
}

/// A single write of a unit of work.
///
/// Updates of a missing record are no-ops, like an `UPDATE` matching no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SetStatus {
        table: String,
        id: TaskId,
        host: String,
        status: HostStatus,
    },
    SetResult {
        table: String,
        id: TaskId,
        host: String,
        status: HostStatus,
        stdout: String,
        stderr: String,
    },
    SetOutput {
        table: String,
        id: TaskId,
        host: String,
        stdout: String,
        stderr: String,
    },
    /// Insert the marker, replacing any marker already stored for its key.
    PutDoing(DoingMarker),
    DeleteDoing { id: TaskId, host: String },
}

/// Writes applied together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    guard: Option<Guard>,
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    /// Create an unguarded unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a unit that only applies while `guard` holds.
    pub fn guarded(guard: Guard) -> Self {
        Self {
            guard: Some(guard),
            ops: Vec::new(),
        }
    }

    /// Append a write.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Guard of this unit.
    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// Writes in application order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Result of applying a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Guard held (or was absent) and every write was applied.
    Applied,
    /// Guard did not hold; nothing was written.
    Rejected,
}

/// Storage backend for task host records and doing markers.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert a new record. Fails if (id, host) already exists.
    async fn insert(&self, table: &str, record: &TaskHost) -> StoreResult<()>;

    /// Insert a record or overwrite status, stdout and stderr of the existing
    /// one, as a single atomic statement.
    async fn upsert(&self, table: &str, record: &TaskHost) -> StoreResult<()>;

    /// Record of (id, host).
    async fn find(&self, table: &str, id: TaskId, host: &str) -> StoreResult<Option<TaskHost>>;

    /// Records of a task ordered by sequence.
    async fn list(&self, table: &str, id: TaskId, filter: &HostFilter)
        -> StoreResult<Vec<TaskHost>>;

    /// Number of records of a task in one of `statuses`.
    async fn count(&self, table: &str, id: TaskId, statuses: &[HostStatus]) -> StoreResult<u64>;

    /// Doing marker of (id, host).
    async fn find_doing(&self, id: TaskId, host: &str) -> StoreResult<Option<DoingMarker>>;

    /// Number of doing markers of (id, host) carrying `clock`.
    async fn count_doing(&self, id: TaskId, host: &str, clock: i64) -> StoreResult<u64>;

    /// Apply a unit of work atomically.
    async fn apply(&self, unit: UnitOfWork) -> StoreResult<UnitOutcome>;
}

/// Open the backend selected by `config`.
pub fn open_store(
    config: &StorageConfig,
    resolver: &dyn TableResolver,
) -> StoreResult<Arc<dyn StatusStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.sqlite_path, resolver)?)),
    }
}

pub(crate) fn duplicate(table: &str, record: &TaskHost) -> StoreError {
    StoreError::Duplicate {
        table: table.to_string(),
        key: host_key(record.id, &record.host),
    }
}
