//! HTTP query parameters and response types.

use serde::{Deserialize, Serialize};

/// Query of the mark done endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct MarkDoneQuery {
    /// Buffer the result locally instead of applying or forwarding it.
    #[serde(default)]
    pub edge_alert: bool,
}

/// Query of the waiting hosts endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WaitingQuery {
    /// Maximum number of hosts returned.
    pub limit: Option<usize>,
}

/// Body of the health endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub authoritative: bool,
    pub buffered: usize,
    pub uptime_secs: i64,
}
