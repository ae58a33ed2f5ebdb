//! FleetRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! All types here describe the per-host status of a dispatched task and the
//! payloads exchanged between edge sites and the center.

pub mod api;
pub mod doing;
pub mod error;
pub mod ids;
pub mod status;
pub mod task_host;

// Re-export commonly used types
pub use api::ApiResponse;
pub use doing::{DoingAction, DoingMarker};
pub use error::CoreError;
pub use ids::TaskId;
pub use status::HostStatus;
pub use task_host::{host_key, DoneReport, HostCounts, HostKey, OutputUpdate, TaskHost};
