//! Role-specific handling of task host writes.
//!
//! The center applies writes to the status store. Edge sites hand them to
//! the center over HTTP.

use std::collections::HashMap;

use async_trait::async_trait;

use fleetrun_core::{DoneReport, HostKey, OutputUpdate, TaskHost};

use crate::error::StatusError;
use crate::metrics::ReportOutcome;

mod authoritative;
mod forwarding;

pub use authoritative::AuthoritativeExecutor;
pub use forwarding::ForwardingExecutor;

/// Writes that every site accepts.
#[async_trait]
pub trait SiteExecutor: Send + Sync {
    /// Insert a new record.
    async fn create(&self, record: &TaskHost) -> Result<(), StatusError>;

    /// Upsert each record independently.
    ///
    /// Returns a map from `"<id>:<host>"` to the error of every record that
    /// failed. An empty map means every record was stored.
    async fn upserts(&self, records: &[TaskHost]) -> Result<HashMap<String, String>, StatusError>;

    /// Move the hosts to running and record one start marker per host.
    ///
    /// Returns the clock stamped on the markers. An empty batch is a no-op.
    async fn bulk_start(&self, hosts: &[HostKey]) -> Result<i64, StatusError>;

    /// Overwrite the partial stdout and stderr of a running host.
    async fn real_time_update_output(&self, update: &OutputUpdate) -> Result<(), StatusError>;

    /// Apply a completion report whose status was already checked to be
    /// terminal.
    async fn mark_done(&self, report: &DoneReport) -> Result<ReportOutcome, StatusError>;
}

pub(crate) fn ensure_not_empty<T>(items: &[T], what: &'static str) -> Result<(), StatusError> {
    if items.is_empty() {
        return Err(StatusError::EmptyInput(what));
    }
    Ok(())
}
