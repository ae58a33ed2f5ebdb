//! Task host status service.
//!
//! Single entry point used by the HTTP API and the replay loop. Writes go
//! through the executor of the site role; reads and single upserts need the
//! status store and only work on the center.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use fleetrun_core::{
    CoreError, DoneReport, HostCounts, HostKey, OutputUpdate, TaskHost, TaskId,
};

use crate::buffer::ResultBuffer;
use crate::cache::{DoingCache, MemoryDoingCache};
use crate::config::Config;
use crate::error::StatusError;
use crate::executor::{AuthoritativeExecutor, ForwardingExecutor, SiteExecutor};
use crate::metrics::{Metrics, ReportOutcome};
use crate::reporter::{ReplaySummary, ResultReporter};
use crate::store::open_store;
use crate::table::ShardedTableResolver;

/// Task host status service of one site.
pub struct TaskHostService {
    executor: Arc<dyn SiteExecutor>,
    center: Option<Arc<AuthoritativeExecutor>>,
    reporter: ResultReporter,
    metrics: Arc<Metrics>,
}

impl TaskHostService {
    /// Service of the center, owning the status store.
    pub fn authoritative(
        center: Arc<AuthoritativeExecutor>,
        cache: Arc<dyn DoingCache>,
        local_task_id_start: TaskId,
    ) -> Self {
        Self::build(center.clone(), Some(center), cache, local_task_id_start)
    }

    /// Service of an edge site, forwarding writes to the center.
    pub fn forwarding(
        forwarder: Arc<ForwardingExecutor>,
        cache: Arc<dyn DoingCache>,
        local_task_id_start: TaskId,
    ) -> Self {
        Self::build(forwarder, None, cache, local_task_id_start)
    }

    fn build(
        executor: Arc<dyn SiteExecutor>,
        center: Option<Arc<AuthoritativeExecutor>>,
        cache: Arc<dyn DoingCache>,
        local_task_id_start: TaskId,
    ) -> Self {
        let reporter = ResultReporter::new(
            Arc::new(ResultBuffer::new()),
            cache,
            executor.clone(),
            local_task_id_start,
        );
        Self {
            executor,
            center,
            reporter,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Build the service described by `config`, opening the status store on
    /// the center.
    pub fn from_config(config: &Config) -> Result<Self, StatusError> {
        config.validate()?;
        let cache: Arc<dyn DoingCache> = Arc::new(MemoryDoingCache::new());

        if !config.authoritative {
            info!(centers = ?config.center_api, "Forwarding writes to center");
            let forwarder = ForwardingExecutor::new(&config.center_api, config.forward_timeout())?;
            return Ok(Self::forwarding(
                Arc::new(forwarder),
                cache,
                config.local_task_id_start,
            ));
        }

        let resolver = Arc::new(ShardedTableResolver::new(
            config.storage.table_prefix.clone(),
            config.storage.table_shards,
        ));
        let store = open_store(&config.storage, resolver.as_ref())?;
        info!(
            backend = ?config.storage.backend,
            shards = config.storage.table_shards,
            "Status store opened"
        );
        let center = AuthoritativeExecutor::new(store, resolver);
        Ok(Self::authoritative(
            Arc::new(center),
            cache,
            config.local_task_id_start,
        ))
    }

    /// Returns true on the center.
    pub fn is_authoritative(&self) -> bool {
        self.center.is_some()
    }

    fn center(&self, op: &'static str) -> Result<&AuthoritativeExecutor, StatusError> {
        self.center
            .as_deref()
            .ok_or(StatusError::NotAuthoritative(op))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Results waiting for replay.
    pub fn buffered(&self) -> usize {
        self.reporter.buffer().len()
    }

    /// Insert a new record.
    pub async fn create(&self, record: &TaskHost) -> Result<(), StatusError> {
        self.executor.create(record).await
    }

    /// Insert or overwrite one record in the status store.
    pub async fn upsert(&self, record: &TaskHost) -> Result<(), StatusError> {
        self.center("upsert")?.hosts().upsert(record).await?;
        Ok(())
    }

    /// Upsert a batch, returning the error of every record that failed.
    pub async fn upserts(
        &self,
        records: &[TaskHost],
    ) -> Result<HashMap<String, String>, StatusError> {
        self.executor.upserts(records).await
    }

    /// Handle a completion report.
    ///
    /// With `edge_alert` the result is buffered for replay instead of being
    /// applied or forwarded.
    pub async fn mark_done(&self, report: &DoneReport, edge_alert: bool) -> Result<(), StatusError> {
        if !report.status.is_done() {
            return Err(CoreError::InvalidStateTransition {
                task_id: report.id,
                host: report.host.clone(),
                to: report.status,
            }
            .into());
        }

        let outcome = if edge_alert {
            self.reporter.cache_mark_done(report.to_record()).await?;
            ReportOutcome::Buffered
        } else {
            self.executor.mark_done(report).await?
        };
        self.metrics.record_report(outcome);
        Ok(())
    }

    /// Start hosts. Returns the attempt clock stamped by the center.
    pub async fn bulk_start(&self, hosts: &[HostKey]) -> Result<i64, StatusError> {
        self.executor.bulk_start(hosts).await
    }

    /// Replace the output of a running host.
    pub async fn real_time_update_output(&self, update: &OutputUpdate) -> Result<(), StatusError> {
        self.executor.real_time_update_output(update).await
    }

    /// Buffer a finished record for replay.
    pub async fn cache_mark_done(&self, record: TaskHost) -> Result<(), StatusError> {
        self.reporter.cache_mark_done(record).await?;
        self.metrics.record_report(ReportOutcome::Buffered);
        Ok(())
    }

    /// Push buffered results to the center.
    pub async fn replay(&self) -> Result<ReplaySummary, StatusError> {
        let summary = self.reporter.replay().await?;
        if summary.total() > 0 {
            self.metrics
                .record_replay(summary.persisted, summary.local_only, summary.failed);
        } else {
            debug!("Nothing to replay");
        }
        Ok(summary)
    }

    pub async fn get(&self, id: TaskId, host: &str) -> Result<Option<TaskHost>, StatusError> {
        self.center("get")?.get(id, host).await
    }

    pub async fn list_waiting(
        &self,
        id: TaskId,
        limit: Option<usize>,
    ) -> Result<Vec<TaskHost>, StatusError> {
        self.center("list_waiting")?.list_waiting(id, limit).await
    }

    pub async fn list_all(&self, id: TaskId) -> Result<Vec<TaskHost>, StatusError> {
        self.center("list_all")?.list_all(id).await
    }

    pub async fn status_only(&self, id: TaskId) -> Result<Vec<TaskHost>, StatusError> {
        self.center("status_only")?.status_only(id).await
    }

    /// Hosts still waiting to start.
    pub async fn waiting_count(&self, id: TaskId) -> Result<u64, StatusError> {
        self.center("waiting_count")?.waiting_count(id).await
    }

    /// Hosts that failed, timed out or could not be killed.
    pub async fn unexpected_count(&self, id: TaskId) -> Result<u64, StatusError> {
        self.center("unexpected_count")?.unexpected_count(id).await
    }

    /// Hosts waiting, running or being killed.
    pub async fn in_progress_count(&self, id: TaskId) -> Result<u64, StatusError> {
        self.center("in_progress_count")?.in_progress_count(id).await
    }

    pub async fn counts(&self, id: TaskId) -> Result<HostCounts, StatusError> {
        self.center("counts")?.counts(id).await
    }
}
