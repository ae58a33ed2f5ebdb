//! Client library for the FleetRun center API.
//!
//! Edge sites use it to forward task host mutations to the center.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::{HttpClient, DEFAULT_TIMEOUT};
