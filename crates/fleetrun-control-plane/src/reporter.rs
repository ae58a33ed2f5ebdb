//! Local capture and replay of completion results.
//!
//! When the center cannot take a result synchronously, the site keeps it in
//! the [`ResultBuffer`] and a replay pushes the whole buffer to the center
//! later, as one batch upsert.

use std::sync::Arc;

use tracing::{debug, info, warn};

use fleetrun_core::{TaskHost, TaskId};

use crate::buffer::ResultBuffer;
use crate::cache::{DoingCache, DOING_CACHE_NAMESPACE};
use crate::error::StatusError;
use crate::executor::SiteExecutor;

/// What one replay did with the results it popped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Results stored by the center.
    pub persisted: usize,
    /// Results of locally synthesized tasks, logged and discarded.
    pub local_only: usize,
    /// Results the center rejected individually.
    pub failed: usize,
}

impl ReplaySummary {
    /// Number of results handled.
    pub fn total(&self) -> usize {
        self.persisted + self.local_only + self.failed
    }
}

/// Buffers results locally and replays them through the site executor.
pub struct ResultReporter {
    buffer: Arc<ResultBuffer>,
    cache: Arc<dyn DoingCache>,
    executor: Arc<dyn SiteExecutor>,
    local_task_id_start: TaskId,
}

impl ResultReporter {
    /// Create a new ResultReporter.
    pub fn new(
        buffer: Arc<ResultBuffer>,
        cache: Arc<dyn DoingCache>,
        executor: Arc<dyn SiteExecutor>,
        local_task_id_start: TaskId,
    ) -> Self {
        Self {
            buffer,
            cache,
            executor,
            local_task_id_start,
        }
    }

    /// Buffer being replayed.
    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    /// Forget the in-flight entry of the record in the doing cache, then
    /// buffer the record. Nothing is buffered if the cache call fails.
    pub async fn cache_mark_done(&self, record: TaskHost) -> Result<(), StatusError> {
        self.cache
            .remove_field(DOING_CACHE_NAMESPACE, &record.key())
            .await?;

        debug!(task_id = %record.id, host = %record.host, status = %record.status, "Result buffered");
        self.buffer.push(record);
        Ok(())
    }

    /// Drain the buffer and push its results to the center.
    ///
    /// Results of local tasks are only logged. Per-record failures are
    /// logged and counted. If the batch call itself fails the popped
    /// results are discarded and the error is returned.
    pub async fn replay(&self) -> Result<ReplaySummary, StatusError> {
        let results = self.buffer.pop_all();
        if results.is_empty() {
            return Ok(ReplaySummary::default());
        }

        let (local, reports): (Vec<TaskHost>, Vec<TaskHost>) = results
            .into_iter()
            .partition(|r| r.id.is_local(self.local_task_id_start));

        for record in &local {
            info!(
                task_id = %record.id,
                host = %record.host,
                status = %record.status,
                stdout = %record.stdout,
                stderr = %record.stderr,
                "Local task result"
            );
        }

        let mut summary = ReplaySummary {
            local_only: local.len(),
            ..ReplaySummary::default()
        };
        if reports.is_empty() {
            return Ok(summary);
        }

        let errors = match self.executor.upserts(&reports).await {
            Ok(errors) => errors,
            Err(e) => {
                warn!(dropped = reports.len(), error = %e, "Replay failed, results discarded");
                return Err(e);
            }
        };
        for (key, error) in &errors {
            warn!(key = %key, error = %error, "Replayed result rejected");
        }

        summary.failed = errors.len();
        summary.persisted = reports.len().saturating_sub(errors.len());
        info!(
            persisted = summary.persisted,
            local_only = summary.local_only,
            failed = summary.failed,
            "Result buffer replayed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fleetrun_core::{DoneReport, HostKey, HostStatus, OutputUpdate};

    use crate::cache::MemoryDoingCache;
    use crate::metrics::ReportOutcome;

    const LOCAL_START: i64 = 1_000;

    /// Records every upsert batch; fails the records listed in `reject`.
    #[derive(Default)]
    struct RecordingExecutor {
        batches: Mutex<Vec<Vec<TaskHost>>>,
        reject: Vec<String>,
        down: bool,
    }

    #[async_trait]
    impl SiteExecutor for RecordingExecutor {
        async fn create(&self, _record: &TaskHost) -> Result<(), StatusError> {
            Ok(())
        }

        async fn upserts(
            &self,
            records: &[TaskHost],
        ) -> Result<HashMap<String, String>, StatusError> {
            if self.down {
                return Err(StatusError::Configuration("center down".to_string()));
            }
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(records
                .iter()
                .filter(|r| self.reject.contains(&r.key()))
                .map(|r| (r.key(), "rejected".to_string()))
                .collect())
        }

        async fn bulk_start(&self, _hosts: &[HostKey]) -> Result<i64, StatusError> {
            Ok(0)
        }

        async fn real_time_update_output(&self, _update: &OutputUpdate) -> Result<(), StatusError> {
            Ok(())
        }

        async fn mark_done(&self, _report: &DoneReport) -> Result<ReportOutcome, StatusError> {
            Ok(ReportOutcome::Forwarded)
        }
    }

    fn reporter(executor: Arc<RecordingExecutor>, cache: Arc<MemoryDoingCache>) -> ResultReporter {
        ResultReporter::new(
            Arc::new(ResultBuffer::new()),
            cache,
            executor,
            TaskId::new(LOCAL_START),
        )
    }

    fn done(id: i64, host: &str) -> TaskHost {
        TaskHost::new(TaskId::new(id), host).with_status(HostStatus::Success)
    }

    #[tokio::test]
    async fn test_cache_mark_done_clears_cache_and_buffers() {
        let cache = Arc::new(MemoryDoingCache::new());
        cache.set_field(DOING_CACHE_NAMESPACE, "100:h1", "1700000000").await;
        let reporter = reporter(Arc::default(), cache.clone());

        reporter.cache_mark_done(done(100, "h1")).await.unwrap();

        assert!(cache.get_field(DOING_CACHE_NAMESPACE, "100:h1").await.is_none());
        assert_eq!(reporter.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_skips_local_tasks() {
        let executor = Arc::new(RecordingExecutor::default());
        let reporter = reporter(executor.clone(), Arc::default());
        reporter.cache_mark_done(done(100, "h1")).await.unwrap();
        reporter.cache_mark_done(done(LOCAL_START, "h1")).await.unwrap();
        reporter.cache_mark_done(done(LOCAL_START + 1, "h2")).await.unwrap();

        let summary = reporter.replay().await.unwrap();

        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.local_only, 2);
        let batches = executor.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].id, TaskId::new(100));
        assert!(reporter.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_replay_only_local_makes_no_call() {
        let executor = Arc::new(RecordingExecutor::default());
        let reporter = reporter(executor.clone(), Arc::default());
        reporter.cache_mark_done(done(LOCAL_START, "h1")).await.unwrap();

        let summary = reporter.replay().await.unwrap();

        assert_eq!(summary.local_only, 1);
        assert!(executor.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_counts_rejected_records() {
        let executor = Arc::new(RecordingExecutor {
            reject: vec!["2:h1".to_string()],
            ..RecordingExecutor::default()
        });
        let reporter = reporter(executor, Arc::default());
        reporter.cache_mark_done(done(1, "h1")).await.unwrap();
        reporter.cache_mark_done(done(2, "h1")).await.unwrap();

        let summary = reporter.replay().await.unwrap();

        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn test_replay_failure_discards_batch() {
        let executor = Arc::new(RecordingExecutor {
            down: true,
            ..RecordingExecutor::default()
        });
        let reporter = reporter(executor, Arc::default());
        reporter.cache_mark_done(done(1, "h1")).await.unwrap();

        assert!(reporter.replay().await.is_err());
        assert!(reporter.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_replay_empty_buffer() {
        let executor = Arc::new(RecordingExecutor::default());
        let reporter = reporter(executor.clone(), Arc::default());

        assert_eq!(reporter.replay().await.unwrap(), ReplaySummary::default());
        assert!(executor.batches.lock().unwrap().is_empty());
    }
}
