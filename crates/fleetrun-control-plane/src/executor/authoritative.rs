//! Executor owning the status store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use fleetrun_core::{DoneReport, HostCounts, HostKey, HostStatus, OutputUpdate, TaskHost, TaskId};

use crate::doing::DoingLedger;
use crate::error::StatusError;
use crate::executor::{ensure_not_empty, SiteExecutor};
use crate::hosts::HostStore;
use crate::metrics::ReportOutcome;
use crate::store::{StatusStore, UnitOfWork, UnitOutcome};
use crate::table::TableResolver;

/// Applies every write directly to the status store.
pub struct AuthoritativeExecutor {
    hosts: HostStore,
    ledger: DoingLedger,
}

impl AuthoritativeExecutor {
    /// Create a new AuthoritativeExecutor.
    pub fn new(store: Arc<dyn StatusStore>, resolver: Arc<dyn TableResolver>) -> Self {
        Self {
            hosts: HostStore::new(store.clone(), resolver),
            ledger: DoingLedger::new(store),
        }
    }

    /// Record accessor.
    pub fn hosts(&self) -> &HostStore {
        &self.hosts
    }

    /// Doing marker ledger.
    pub fn ledger(&self) -> &DoingLedger {
        &self.ledger
    }

    /// Move every host to running with one start marker each, all stamped
    /// with `clock`. No store call for an empty batch.
    pub async fn bulk_start_at(&self, hosts: &[HostKey], clock: i64) -> Result<(), StatusError> {
        if hosts.is_empty() {
            return Ok(());
        }

        let mut unit = UnitOfWork::new();
        for key in hosts {
            self.hosts
                .stage_status(&mut unit, key.id, &key.host, HostStatus::Running);
            self.ledger.stage_start(&mut unit, key.id, &key.host, clock);
        }
        self.hosts.apply(unit).await?;

        info!(hosts = hosts.len(), clock, "Hosts started");
        Ok(())
    }

    pub async fn get(&self, id: TaskId, host: &str) -> Result<Option<TaskHost>, StatusError> {
        Ok(self.hosts.get(id, host).await?)
    }

    pub async fn list_waiting(
        &self,
        id: TaskId,
        limit: Option<usize>,
    ) -> Result<Vec<TaskHost>, StatusError> {
        Ok(self.hosts.list_waiting(id, limit).await?)
    }

    pub async fn list_all(&self, id: TaskId) -> Result<Vec<TaskHost>, StatusError> {
        Ok(self.hosts.list_all(id).await?)
    }

    pub async fn status_only(&self, id: TaskId) -> Result<Vec<TaskHost>, StatusError> {
        Ok(self.hosts.status_only(id).await?)
    }

    pub async fn waiting_count(&self, id: TaskId) -> Result<u64, StatusError> {
        Ok(self.hosts.waiting_count(id).await?)
    }

    pub async fn unexpected_count(&self, id: TaskId) -> Result<u64, StatusError> {
        Ok(self.hosts.unexpected_count(id).await?)
    }

    pub async fn in_progress_count(&self, id: TaskId) -> Result<u64, StatusError> {
        Ok(self.hosts.in_progress_count(id).await?)
    }

    pub async fn counts(&self, id: TaskId) -> Result<HostCounts, StatusError> {
        Ok(self.hosts.counts(id).await?)
    }
}

#[async_trait]
impl SiteExecutor for AuthoritativeExecutor {
    async fn create(&self, record: &TaskHost) -> Result<(), StatusError> {
        self.hosts.create(record).await?;
        Ok(())
    }

    async fn upserts(&self, records: &[TaskHost]) -> Result<HashMap<String, String>, StatusError> {
        ensure_not_empty(records, "upserts needs at least one record")?;

        let mut errors = HashMap::new();
        for record in records {
            if let Err(e) = self.hosts.upsert(record).await {
                errors.insert(record.key(), e.to_string());
            }
        }
        Ok(errors)
    }

    async fn bulk_start(&self, hosts: &[HostKey]) -> Result<i64, StatusError> {
        let clock = Utc::now().timestamp();
        self.bulk_start_at(hosts, clock).await?;
        Ok(clock)
    }

    async fn real_time_update_output(&self, update: &OutputUpdate) -> Result<(), StatusError> {
        let mut unit = UnitOfWork::new();
        self.hosts.stage_output(
            &mut unit,
            update.id,
            &update.host,
            &update.stdout,
            &update.stderr,
        );
        self.hosts.apply(unit).await?;

        debug!(task_id = %update.id, host = %update.host, "Output updated");
        Ok(())
    }

    async fn mark_done(&self, report: &DoneReport) -> Result<ReportOutcome, StatusError> {
        let record = report.to_record();

        // Fresh report: the marker still carries this attempt's clock.
        let mut unit = UnitOfWork::guarded(self.ledger.clock_guard(
            report.id,
            &report.host,
            report.clock,
        ));
        self.hosts.stage_result(&mut unit, &record);
        self.ledger.stage_delete(&mut unit, report.id, &report.host);
        if self.hosts.apply(unit).await? == UnitOutcome::Applied {
            info!(
                task_id = %report.id,
                host = %report.host,
                status = %report.status,
                clock = report.clock,
                "Host done"
            );
            return Ok(ReportOutcome::Applied);
        }

        // Late report: only a watchdog timeout may be corrected.
        let mut unit = UnitOfWork::guarded(self.hosts.status_guard(
            report.id,
            &report.host,
            HostStatus::Timeout,
        ));
        self.hosts.stage_result(&mut unit, &record);
        if self.hosts.apply(unit).await? == UnitOutcome::Applied {
            info!(
                task_id = %report.id,
                host = %report.host,
                status = %report.status,
                clock = report.clock,
                "Late result replaced timeout"
            );
            return Ok(ReportOutcome::TimeoutOverwrite);
        }

        warn!(
            task_id = %report.id,
            host = %report.host,
            status = %report.status,
            clock = report.clock,
            "Dropping stale result"
        );
        Ok(ReportOutcome::StaleDropped)
    }
}
