//! Task host records and the payloads that change them.

use serde::{Deserialize, Serialize};

use crate::{HostStatus, TaskId};

/// Composite identity of a (task, host) pair, e.g. `"100:h1"`.
pub fn host_key(id: TaskId, host: &str) -> String {
    format!("{}:{}", id, host)
}

/// Status record of a task on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHost {
    /// Insertion order within the task table. Never part of the identity and
    /// never sent over the wire.
    #[serde(skip)]
    pub sequence: u64,

    /// Task identifier.
    pub id: TaskId,

    /// Host the task runs on.
    pub host: String,

    /// Current status.
    pub status: HostStatus,

    /// Captured standard output (replaced on each update).
    #[serde(default)]
    pub stdout: String,

    /// Captured standard error (replaced on each update).
    #[serde(default)]
    pub stderr: String,
}

impl TaskHost {
    /// Create a waiting record with empty output.
    pub fn new(id: TaskId, host: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            id,
            host: host.into(),
            status: HostStatus::Waiting,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Builder method to set the status.
    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder method to set captured output.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Composite identity, e.g. `"100:h1"`.
    pub fn key(&self) -> String {
        host_key(self.id, &self.host)
    }

    /// Copy without output, as returned by status-only listings.
    pub fn status_only(&self) -> Self {
        Self {
            sequence: self.sequence,
            id: self.id,
            host: self.host.clone(),
            status: self.status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// (task, host) pair used when starting hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostKey {
    pub id: TaskId,
    pub host: String,
}

impl HostKey {
    /// Create a new HostKey.
    pub fn new(id: TaskId, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
        }
    }
}

/// Completion report sent by a host, carrying the clock of the execution
/// attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneReport {
    pub id: TaskId,
    pub clock: i64,
    pub host: String,
    pub status: HostStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl DoneReport {
    /// Create a new DoneReport.
    pub fn new(
        id: TaskId,
        clock: i64,
        host: impl Into<String>,
        status: HostStatus,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            id,
            clock,
            host: host.into(),
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Snapshot of the record this report should produce.
    pub fn to_record(&self) -> TaskHost {
        TaskHost::new(self.id, self.host.clone())
            .with_status(self.status)
            .with_output(self.stdout.clone(), self.stderr.clone())
    }
}

/// Progressive output of a running host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUpdate {
    pub id: TaskId,
    pub host: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Aggregate host counts of one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCounts {
    /// Hosts still waiting to start.
    pub waiting: u64,
    /// Hosts that failed, timed out or could not be killed.
    pub unexpected: u64,
    /// Hosts waiting, running or being killed.
    pub in_progress: u64,
}
