//! Mapping from task ids to physical tables.

use fleetrun_core::TaskId;

/// Default number of task host tables.
pub const DEFAULT_TABLE_SHARDS: u32 = 100;

/// Resolves the table holding the host records of a task.
///
/// Implementations must be deterministic: the same id always maps to the
/// same table.
pub trait TableResolver: Send + Sync {
    /// Table holding the host records of `id`.
    fn table_for(&self, id: TaskId) -> String;

    /// Every table `table_for` can return.
    fn tables(&self) -> Vec<String>;

    /// Table holding the doing markers.
    fn doing_table(&self) -> String;
}

/// Spreads tasks over `shards` tables named `{prefix}task_host_{n}`.
#[derive(Debug, Clone)]
pub struct ShardedTableResolver {
    prefix: String,
    shards: u32,
}

impl ShardedTableResolver {
    /// Create a new resolver. Zero shards is treated as one.
    pub fn new(prefix: impl Into<String>, shards: u32) -> Self {
        Self {
            prefix: prefix.into(),
            shards: shards.max(1),
        }
    }
}

impl Default for ShardedTableResolver {
    fn default() -> Self {
        Self::new("", DEFAULT_TABLE_SHARDS)
    }
}

impl TableResolver for ShardedTableResolver {
    fn table_for(&self, id: TaskId) -> String {
        let shard = id.get().rem_euclid(i64::from(self.shards));
        format!("{}task_host_{}", self.prefix, shard)
    }

    fn tables(&self) -> Vec<String> {
        (0..self.shards)
            .map(|shard| format!("{}task_host_{}", self.prefix, shard))
            .collect()
    }

    fn doing_table(&self) -> String {
        format!("{}task_host_doing", self.prefix)
    }
}
