//! Per-host status of a task.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Status of a task on a single host.
///
/// ```text
/// waiting -> running -> success | failed | timeout | killfailed
///            running -> killing -> killfailed | success
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    /// Host selected but execution not started yet.
    #[default]
    Waiting,
    /// Execution started on the host.
    Running,
    /// Cancellation requested by an operator.
    Killing,
    /// Execution finished successfully.
    Success,
    /// Execution finished with an error.
    Failed,
    /// Watchdog gave up waiting for a result.
    Timeout,
    /// Cancellation could not stop the execution.
    #[serde(rename = "killfailed")]
    KillFailed,
}

impl HostStatus {
    /// Statuses counted as unexpected outcomes.
    pub const UNEXPECTED: &'static [HostStatus] =
        &[Self::Failed, Self::Timeout, Self::KillFailed];

    /// Statuses of hosts that have not reached an outcome yet.
    pub const IN_PROGRESS: &'static [HostStatus] = &[Self::Waiting, Self::Running, Self::Killing];

    /// Every status, in state machine order.
    pub const ALL: &'static [HostStatus] = &[
        Self::Waiting,
        Self::Running,
        Self::Killing,
        Self::Success,
        Self::Failed,
        Self::Timeout,
        Self::KillFailed,
    ];

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Killing => "killing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::KillFailed => "killfailed",
        }
    }

    /// Returns true if the status is an execution outcome.
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Timeout | Self::KillFailed
        )
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}
