//! Task host record access, scoped to the table of each task.

use std::sync::Arc;

use fleetrun_core::{HostCounts, HostStatus, TaskHost, TaskId};

use crate::store::{Guard, HostFilter, StatusStore, StoreResult, UnitOfWork, UnitOutcome, WriteOp};
use crate::table::TableResolver;

/// Reads and writes task host records through the table resolver.
#[derive(Clone)]
pub struct HostStore {
    store: Arc<dyn StatusStore>,
    resolver: Arc<dyn TableResolver>,
}

impl HostStore {
    /// Create a new HostStore.
    pub fn new(store: Arc<dyn StatusStore>, resolver: Arc<dyn TableResolver>) -> Self {
        Self { store, resolver }
    }

    /// Table holding the records of `id`.
    pub fn table_for(&self, id: TaskId) -> String {
        self.resolver.table_for(id)
    }

    /// Insert a new record.
    pub async fn create(&self, record: &TaskHost) -> StoreResult<()> {
        self.store.insert(&self.table_for(record.id), record).await
    }

    /// Insert or overwrite status and output of a record.
    pub async fn upsert(&self, record: &TaskHost) -> StoreResult<()> {
        self.store.upsert(&self.table_for(record.id), record).await
    }

    /// Record of (id, host).
    pub async fn get(&self, id: TaskId, host: &str) -> StoreResult<Option<TaskHost>> {
        self.store.find(&self.table_for(id), id, host).await
    }

    /// Waiting hosts in insertion order.
    pub async fn list_waiting(&self, id: TaskId, limit: Option<usize>) -> StoreResult<Vec<TaskHost>> {
        let filter = HostFilter::with_statuses(&[HostStatus::Waiting]).with_limit(limit);
        self.store.list(&self.table_for(id), id, &filter).await
    }

    /// Every host of the task in insertion order.
    pub async fn list_all(&self, id: TaskId) -> StoreResult<Vec<TaskHost>> {
        self.store
            .list(&self.table_for(id), id, &HostFilter::all())
            .await
    }

    /// Every host of the task without captured output.
    pub async fn status_only(&self, id: TaskId) -> StoreResult<Vec<TaskHost>> {
        Ok(self
            .list_all(id)
            .await?
            .iter()
            .map(TaskHost::status_only)
            .collect())
    }

    /// Number of hosts of the task in one of `statuses`.
    pub async fn count_by_status(&self, id: TaskId, statuses: &[HostStatus]) -> StoreResult<u64> {
        self.store.count(&self.table_for(id), id, statuses).await
    }

    pub async fn waiting_count(&self, id: TaskId) -> StoreResult<u64> {
        self.count_by_status(id, &[HostStatus::Waiting]).await
    }

    pub async fn unexpected_count(&self, id: TaskId) -> StoreResult<u64> {
        self.count_by_status(id, HostStatus::UNEXPECTED).await
    }

    pub async fn in_progress_count(&self, id: TaskId) -> StoreResult<u64> {
        self.count_by_status(id, HostStatus::IN_PROGRESS).await
    }

    /// All three aggregates. Each count is its own snapshot.
    pub async fn counts(&self, id: TaskId) -> StoreResult<HostCounts> {
        Ok(HostCounts {
            waiting: self.waiting_count(id).await?,
            unexpected: self.unexpected_count(id).await?,
            in_progress: self.in_progress_count(id).await?,
        })
    }

    /// Stage a status change.
    pub fn stage_status(&self, unit: &mut UnitOfWork, id: TaskId, host: &str, status: HostStatus) {
        unit.push(WriteOp::SetStatus {
            table: self.table_for(id),
            id,
            host: host.to_string(),
            status,
        });
    }

    /// Stage status and output of a finished execution.
    pub fn stage_result(&self, unit: &mut UnitOfWork, record: &TaskHost) {
        unit.push(WriteOp::SetResult {
            table: self.table_for(record.id),
            id: record.id,
            host: record.host.clone(),
            status: record.status,
            stdout: record.stdout.clone(),
            stderr: record.stderr.clone(),
        });
    }

    /// Stage an output-only update.
    pub fn stage_output(&self, unit: &mut UnitOfWork, id: TaskId, host: &str, stdout: &str, stderr: &str) {
        unit.push(WriteOp::SetOutput {
            table: self.table_for(id),
            id,
            host: host.to_string(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
    }

    /// Guard holding while (id, host) is stored in `status`.
    pub fn status_guard(&self, id: TaskId, host: &str, status: HostStatus) -> Guard {
        Guard::Status {
            table: self.table_for(id),
            id,
            host: host.to_string(),
            status,
        }
    }

    /// Apply a unit of work.
    pub async fn apply(&self, unit: UnitOfWork) -> StoreResult<UnitOutcome> {
        self.store.apply(unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::table::ShardedTableResolver;

    fn hosts() -> HostStore {
        HostStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ShardedTableResolver::default()),
        )
    }

    #[tokio::test]
    async fn test_counts_by_status_set() {
        let hosts = hosts();
        let id = TaskId::new(100);
        let statuses = [
            ("h1", HostStatus::Waiting),
            ("h2", HostStatus::Running),
            ("h3", HostStatus::Failed),
            ("h4", HostStatus::Timeout),
            ("h5", HostStatus::Success),
            ("h6", HostStatus::Killing),
        ];
        for (host, status) in statuses {
            hosts
                .create(&TaskHost::new(id, host).with_status(status))
                .await
                .unwrap();
        }

        let counts = hosts.counts(id).await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.unexpected, 2);
        assert_eq!(counts.in_progress, 3);
    }

    #[tokio::test]
    async fn test_tasks_sharing_a_table_stay_apart() {
        let hosts = hosts();
        let a = TaskId::new(100);
        let b = TaskId::new(200);
        assert_eq!(hosts.table_for(a), hosts.table_for(b));

        hosts.create(&TaskHost::new(a, "h1")).await.unwrap();
        hosts.create(&TaskHost::new(b, "h1")).await.unwrap();
        hosts.create(&TaskHost::new(b, "h2")).await.unwrap();

        assert_eq!(hosts.list_all(a).await.unwrap().len(), 1);
        assert_eq!(hosts.list_waiting(b, None).await.unwrap().len(), 2);
        assert_eq!(hosts.list_waiting(b, Some(1)).await.unwrap()[0].host, "h1");
    }

    #[tokio::test]
    async fn test_status_only_drops_output() {
        let hosts = hosts();
        let id = TaskId::new(7);
        hosts
            .upsert(
                &TaskHost::new(id, "h1")
                    .with_status(HostStatus::Success)
                    .with_output("lots of output", "warn"),
            )
            .await
            .unwrap();

        let rows = hosts.status_only(id).await.unwrap();
        assert_eq!(rows[0].status, HostStatus::Success);
        assert!(rows[0].stdout.is_empty());
        assert!(rows[0].stderr.is_empty());

        let full = hosts.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(full.stdout, "lots of output");
    }
}
