//! Errors surfaced by task host operations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use fleetrun_client::ClientError;
use fleetrun_core::{ApiResponse, CoreError};

use crate::cache::CacheError;
use crate::store::StoreError;

/// Errors of the task host service.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Query or transaction failed. Never retried internally.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The center could not be reached or rejected the call.
    #[error("Forwarding error: {0}")]
    Forwarding(#[from] ClientError),

    /// A batch operation was called without items.
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// The process cannot start with this configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation needs the status store, which only the center owns.
    #[error("Operation '{0}' is only available on the authoritative site")]
    NotAuthoritative(&'static str),

    /// The distributed doing cache failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid domain input.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StatusError {
    /// HTTP status used when the error is returned by the API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyInput(_) | Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthoritative(_) => StatusCode::CONFLICT,
            Self::Forwarding(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Configuration(_) | Self::Cache(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ApiResponse::<()>::error(self.to_string())),
        )
            .into_response()
    }
}
