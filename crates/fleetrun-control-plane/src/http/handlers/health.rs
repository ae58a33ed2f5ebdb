//! Health and metrics handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::http::responses::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        authoritative: state.service.is_authoritative(),
        buffered: state.service.buffered(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.service.metrics().render(state.service.buffered());
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
