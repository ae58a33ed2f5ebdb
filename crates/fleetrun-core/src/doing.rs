//! In-flight ("doing") markers.

use serde::{Deserialize, Serialize};

use crate::TaskId;

/// What started the tracked execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoingAction {
    /// Host was moved from waiting to running.
    #[default]
    Start,
}

impl DoingAction {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
        }
    }
}

/// Proof that a specific execution attempt of a task on a host is in flight.
///
/// The `clock` acts as a version token: a completion report is only fresh if
/// it carries the clock of the marker currently stored for its (task, host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoingMarker {
    /// Task being executed.
    pub id: TaskId,

    /// Host executing it.
    pub host: String,

    /// Unix timestamp (seconds) identifying the execution attempt.
    pub clock: i64,

    /// What started the execution.
    pub action: DoingAction,
}

impl DoingMarker {
    /// Create a marker for a freshly started execution.
    pub fn start(id: TaskId, host: impl Into<String>, clock: i64) -> Self {
        Self {
            id,
            host: host.into(),
            clock,
            action: DoingAction::Start,
        }
    }

    /// Cache key shared with the distributed doing cache.
    pub fn cache_key(&self) -> String {
        crate::task_host::host_key(self.id, &self.host)
    }
}
