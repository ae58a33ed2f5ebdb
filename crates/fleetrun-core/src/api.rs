//! Wire envelope and paths of the center HTTP API.

use serde::{Deserialize, Serialize};

/// Create one task host record.
pub const TASK_HOST_PATH: &str = "/v1/task/host";

/// Upsert a batch of task host records.
pub const TASK_HOSTS_UPSERT_PATH: &str = "/v1/task/hosts/upsert";

/// Report the outcome of an execution attempt.
pub const MARK_DONE_PATH: &str = "/v1/mark/done";

/// Move waiting hosts to running.
pub const TASK_HOSTS_RUN_PATH: &str = "/v1/task/hosts/run";

/// Stream output of a running host.
pub const TASK_HOST_OUTPUT_PATH: &str = "/v1/task/host/output";

/// Response envelope used by every center endpoint.
///
/// `err` is empty on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub dat: Option<T>,
    #[serde(default)]
    pub err: String,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `dat`.
    pub fn ok(dat: T) -> Self {
        Self {
            dat: Some(dat),
            err: String::new(),
        }
    }

    /// Failed response.
    pub fn error(err: impl Into<String>) -> Self {
        Self {
            dat: None,
            err: err.into(),
        }
    }

    /// Returns true if the center reported an error.
    pub fn is_err(&self) -> bool {
        !self.err.is_empty()
    }
}

impl ApiResponse<()> {
    /// Successful response without payload.
    pub fn empty() -> Self {
        Self {
            dat: None,
            err: String::new(),
        }
    }
}
