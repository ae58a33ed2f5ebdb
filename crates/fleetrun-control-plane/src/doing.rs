//! Ledger of in-flight executions.
//!
//! A marker for (task, host) carries the clock of the execution attempt most
//! recently started there. The completion path only trusts reports carrying
//! that clock; everything else is a late or duplicate result.

use std::sync::Arc;

use fleetrun_core::{DoingMarker, TaskId};

use crate::store::{Guard, StatusStore, StoreResult, UnitOfWork, WriteOp};

/// Doing marker ledger backed by the status store.
#[derive(Clone)]
pub struct DoingLedger {
    store: Arc<dyn StatusStore>,
}

impl DoingLedger {
    /// Create a new DoingLedger.
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Record that `host` started executing `id` at `clock`.
    pub async fn record_start(&self, id: TaskId, host: &str, clock: i64) -> StoreResult<()> {
        let mut unit = UnitOfWork::new();
        self.stage_start(&mut unit, id, host, clock);
        self.store.apply(unit).await?;
        Ok(())
    }

    /// Number of markers of (id, host) carrying `clock` (0 or 1).
    pub async fn count_matching(&self, id: TaskId, host: &str, clock: i64) -> StoreResult<u64> {
        self.store.count_doing(id, host, clock).await
    }

    /// Current marker of (id, host).
    pub async fn get(&self, id: TaskId, host: &str) -> StoreResult<Option<DoingMarker>> {
        self.store.find_doing(id, host).await
    }

    /// Forget the marker of (id, host).
    pub async fn delete(&self, id: TaskId, host: &str) -> StoreResult<()> {
        let mut unit = UnitOfWork::new();
        self.stage_delete(&mut unit, id, host);
        self.store.apply(unit).await?;
        Ok(())
    }

    /// Stage a start marker.
    pub fn stage_start(&self, unit: &mut UnitOfWork, id: TaskId, host: &str, clock: i64) {
        unit.push(WriteOp::PutDoing(DoingMarker::start(id, host, clock)));
    }

    /// Stage removal of the marker of (id, host).
    pub fn stage_delete(&self, unit: &mut UnitOfWork, id: TaskId, host: &str) {
        unit.push(WriteOp::DeleteDoing {
            id,
            host: host.to_string(),
        });
    }

    /// Guard holding while the marker of (id, host) carries `clock`.
    pub fn clock_guard(&self, id: TaskId, host: &str, clock: i64) -> Guard {
        Guard::DoingClock {
            id,
            host: host.to_string(),
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_record_count_delete() {
        let ledger = DoingLedger::new(Arc::new(MemoryStore::new()));
        let id = TaskId::new(100);

        ledger.record_start(id, "h1", 1_700_000_000).await.unwrap();
        assert_eq!(ledger.count_matching(id, "h1", 1_700_000_000).await.unwrap(), 1);
        assert_eq!(ledger.count_matching(id, "h1", 1_699_999_999).await.unwrap(), 0);
        assert_eq!(ledger.count_matching(id, "h2", 1_700_000_000).await.unwrap(), 0);

        let marker = ledger.get(id, "h1").await.unwrap().unwrap();
        assert_eq!(marker.cache_key(), "100:h1");

        ledger.delete(id, "h1").await.unwrap();
        assert!(ledger.get(id, "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restart_supersedes_older_clock() {
        let ledger = DoingLedger::new(Arc::new(MemoryStore::new()));
        let id = TaskId::new(100);

        ledger.record_start(id, "h1", 10).await.unwrap();
        ledger.record_start(id, "h1", 20).await.unwrap();

        assert_eq!(ledger.count_matching(id, "h1", 10).await.unwrap(), 0);
        assert_eq!(ledger.get(id, "h1").await.unwrap().unwrap().clock, 20);
    }
}
