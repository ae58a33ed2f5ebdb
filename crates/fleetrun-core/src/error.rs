//! Core domain errors.

use thiserror::Error;

use crate::{HostStatus, TaskId};

/// Core domain errors for FleetRun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown status string.
    #[error("Unknown host status: {0}")]
    UnknownStatus(String),

    /// Invalid state transition.
    #[error("Invalid state transition for task {task_id} host {host}: -> {to}")]
    InvalidStateTransition {
        task_id: TaskId,
        host: String,
        to: HostStatus,
    },
}
