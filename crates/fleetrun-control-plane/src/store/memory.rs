//! In-memory status store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use fleetrun_core::{DoingMarker, HostStatus, TaskHost, TaskId};

use super::{
    duplicate, Guard, HostFilter, StatusStore, StoreResult, UnitOfWork, UnitOutcome, WriteOp,
};

/// Rows of one task host table.
#[derive(Default)]
struct Table {
    /// Rows indexed by sequence, so iteration follows insertion order.
    rows: BTreeMap<u64, TaskHost>,
    index: HashMap<(TaskId, String), u64>,
}

impl Table {
    fn get(&self, id: TaskId, host: &str) -> Option<&TaskHost> {
        self.index
            .get(&(id, host.to_string()))
            .and_then(|seq| self.rows.get(seq))
    }

    fn get_mut(&mut self, id: TaskId, host: &str) -> Option<&mut TaskHost> {
        let seq = *self.index.get(&(id, host.to_string()))?;
        self.rows.get_mut(&seq)
    }
}

#[derive(Default)]
struct Tables {
    next_sequence: u64,
    tables: HashMap<String, Table>,
    doing: HashMap<(TaskId, String), DoingMarker>,
}

impl Tables {
    fn insert(&mut self, table: &str, record: &TaskHost) {
        self.next_sequence += 1;
        let seq = self.next_sequence;

        let mut row = record.clone();
        row.sequence = seq;

        let table = self.tables.entry(table.to_string()).or_default();
        table.index.insert((row.id, row.host.clone()), seq);
        table.rows.insert(seq, row);
    }

    fn row_mut(&mut self, table: &str, id: TaskId, host: &str) -> Option<&mut TaskHost> {
        self.tables.get_mut(table)?.get_mut(id, host)
    }

    fn holds(&self, guard: &Guard) -> bool {
        match guard {
            Guard::DoingClock { id, host, clock } => self
                .doing
                .get(&(*id, host.clone()))
                .is_some_and(|marker| marker.clock == *clock),
            Guard::Status {
                table,
                id,
                host,
                status,
            } => self
                .tables
                .get(table)
                .and_then(|t| t.get(*id, host))
                .is_some_and(|row| row.status == *status),
        }
    }

    fn write(&mut self, op: WriteOp) {
        match op {
            WriteOp::SetStatus {
                table,
                id,
                host,
                status,
            } => {
                if let Some(row) = self.row_mut(&table, id, &host) {
                    row.status = status;
                }
            }
            WriteOp::SetResult {
                table,
                id,
                host,
                status,
                stdout,
                stderr,
            } => {
                if let Some(row) = self.row_mut(&table, id, &host) {
                    row.status = status;
                    row.stdout = stdout;
                    row.stderr = stderr;
                }
            }
            WriteOp::SetOutput {
                table,
                id,
                host,
                stdout,
                stderr,
            } => {
                if let Some(row) = self.row_mut(&table, id, &host) {
                    row.stdout = stdout;
                    row.stderr = stderr;
                }
            }
            WriteOp::PutDoing(marker) => {
                self.doing.insert((marker.id, marker.host.clone()), marker);
            }
            WriteOp::DeleteDoing { id, host } => {
                self.doing.remove(&(id, host));
            }
        }
    }
}

/// Status store kept in process memory.
///
/// Every unit of work runs under a single write-lock acquisition, so no
/// reader observes a half-applied unit.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn insert(&self, table: &str, record: &TaskHost) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let exists = inner
            .tables
            .get(table)
            .is_some_and(|t| t.get(record.id, &record.host).is_some());
        if exists {
            return Err(duplicate(table, record));
        }
        inner.insert(table, record);
        Ok(())
    }

    async fn upsert(&self, table: &str, record: &TaskHost) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.row_mut(table, record.id, &record.host) {
            Some(row) => {
                row.status = record.status;
                row.stdout = record.stdout.clone();
                row.stderr = record.stderr.clone();
            }
            None => inner.insert(table, record),
        }
        Ok(())
    }

    async fn find(&self, table: &str, id: TaskId, host: &str) -> StoreResult<Option<TaskHost>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tables
            .get(table)
            .and_then(|t| t.get(id, host))
            .cloned())
    }

    async fn list(
        &self,
        table: &str,
        id: TaskId,
        filter: &HostFilter,
    ) -> StoreResult<Vec<TaskHost>> {
        let inner = self.inner.read().await;
        let Some(table) = inner.tables.get(table) else {
            return Ok(Vec::new());
        };

        let rows = table
            .rows
            .values()
            .filter(|row| row.id == id && filter.matches(row))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn count(&self, table: &str, id: TaskId, statuses: &[HostStatus]) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        let count = inner.tables.get(table).map_or(0, |t| {
            t.rows
                .values()
                .filter(|row| row.id == id && statuses.contains(&row.status))
                .count()
        });
        Ok(count as u64)
    }

    async fn find_doing(&self, id: TaskId, host: &str) -> StoreResult<Option<DoingMarker>> {
        let inner = self.inner.read().await;
        Ok(inner.doing.get(&(id, host.to_string())).cloned())
    }

    async fn count_doing(&self, id: TaskId, host: &str, clock: i64) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        let matching = inner
            .doing
            .get(&(id, host.to_string()))
            .is_some_and(|marker| marker.clock == clock);
        Ok(u64::from(matching))
    }

    async fn apply(&self, unit: UnitOfWork) -> StoreResult<UnitOutcome> {
        let mut inner = self.inner.write().await;
        if let Some(guard) = unit.guard() {
            if !inner.holds(guard) {
                return Ok(UnitOutcome::Rejected);
            }
        }
        for op in unit.ops {
            inner.write(op);
        }
        Ok(UnitOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "task_host_0";

    fn record(host: &str) -> TaskHost {
        TaskHost::new(TaskId::new(100), host)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert(TABLE, &record("h1")).await.unwrap();

        let err = store.insert(TABLE, &record("h1")).await.unwrap_err();
        assert!(err.to_string().contains("100:h1"));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let store = MemoryStore::new();
        store.upsert(TABLE, &record("h1")).await.unwrap();
        store.upsert(TABLE, &record("h2")).await.unwrap();
        store
            .upsert(
                TABLE,
                &record("h1")
                    .with_status(HostStatus::Success)
                    .with_output("ok", ""),
            )
            .await
            .unwrap();

        let rows = store
            .list(TABLE, TaskId::new(100), &HostFilter::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].host, "h1");
        assert_eq!(rows[0].status, HostStatus::Success);
        assert_eq!(rows[0].stdout, "ok");
        assert!(rows[0].sequence < rows[1].sequence);
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let store = MemoryStore::new();
        for host in ["h1", "h2", "h3"] {
            store.insert(TABLE, &record(host)).await.unwrap();
        }
        store
            .insert(TABLE, &TaskHost::new(TaskId::new(200), "h1"))
            .await
            .unwrap();

        let waiting = store
            .list(
                TABLE,
                TaskId::new(100),
                &HostFilter::with_statuses(&[HostStatus::Waiting]).with_limit(Some(2)),
            )
            .await
            .unwrap();
        let hosts: Vec<_> = waiting.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2"]);

        let count = store
            .count(TABLE, TaskId::new(100), HostStatus::IN_PROGRESS)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_rejected_guard_writes_nothing() {
        let store = MemoryStore::new();
        store.insert(TABLE, &record("h1")).await.unwrap();

        let mut unit = UnitOfWork::guarded(Guard::DoingClock {
            id: TaskId::new(100),
            host: "h1".into(),
            clock: 7,
        });
        unit.push(WriteOp::SetStatus {
            table: TABLE.into(),
            id: TaskId::new(100),
            host: "h1".into(),
            status: HostStatus::Success,
        });

        assert_eq!(store.apply(unit).await.unwrap(), UnitOutcome::Rejected);
        let row = store.find(TABLE, TaskId::new(100), "h1").await.unwrap().unwrap();
        assert_eq!(row.status, HostStatus::Waiting);
    }

    #[tokio::test]
    async fn test_put_doing_replaces_marker() {
        let store = MemoryStore::new();
        for clock in [10, 20] {
            let mut unit = UnitOfWork::new();
            unit.push(WriteOp::PutDoing(DoingMarker::start(TaskId::new(100), "h1", clock)));
            store.apply(unit).await.unwrap();
        }

        assert_eq!(store.count_doing(TaskId::new(100), "h1", 10).await.unwrap(), 0);
        assert_eq!(store.count_doing(TaskId::new(100), "h1", 20).await.unwrap(), 1);
    }
}
