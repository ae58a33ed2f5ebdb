//! Error types for the center client.

use thiserror::Error;

/// Errors that can occur when talking to the center.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The center answered with a non-success status and no usable body.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// The center processed the request and reported an error.
    #[error("center error: {0}")]
    Remote(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Returns true if another center address may succeed where this one failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}
