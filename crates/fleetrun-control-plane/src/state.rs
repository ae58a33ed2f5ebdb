//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::service::TaskHostService;

/// Shared application state.
pub struct AppState {
    /// Task host service of this site.
    pub service: Arc<TaskHostService>,

    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(service: TaskHostService) -> Arc<Self> {
        Self::with_service(Arc::new(service))
    }

    /// Create a new AppState sharing `service` with background tasks.
    pub fn with_service(service: Arc<TaskHostService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            started_at: Utc::now(),
        })
    }

    /// Seconds since the process started.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
