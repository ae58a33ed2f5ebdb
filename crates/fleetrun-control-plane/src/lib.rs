//! FleetRun Control Plane Library
//!
//! This crate tracks the status of a task on each host it runs on. The
//! center applies state transitions to the status store; edge sites forward
//! them to the center or buffer results locally for later replay.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod doing;
pub mod error;
pub mod executor;
pub mod hosts;
pub mod http;
pub mod metrics;
pub mod replay;
pub mod reporter;
pub mod service;
pub mod state;
pub mod store;
pub mod table;

pub use config::Config;
pub use error::StatusError;
pub use service::TaskHostService;
pub use state::AppState;
