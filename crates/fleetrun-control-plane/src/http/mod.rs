//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task host writes (`/v1/task/host`, `/v1/task/hosts/upsert`, `/v1/mark/done`)
//! - Host start and live output (`/v1/task/hosts/run`, `/v1/task/host/output`)
//! - Task host reads (`/v1/task/:id/...`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use fleetrun_core::api::{
    MARK_DONE_PATH, TASK_HOSTS_RUN_PATH, TASK_HOSTS_UPSERT_PATH, TASK_HOST_OUTPUT_PATH,
    TASK_HOST_PATH,
};

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Writes
        .route(TASK_HOST_PATH, post(handlers::create_task_host))
        .route(TASK_HOSTS_UPSERT_PATH, post(handlers::upsert_task_hosts))
        .route(MARK_DONE_PATH, post(handlers::mark_done))
        .route(TASK_HOSTS_RUN_PATH, post(handlers::run_task_hosts))
        .route(TASK_HOST_OUTPUT_PATH, post(handlers::update_output))
        // Reads
        .route("/v1/task/:id/host/:host", get(handlers::get_task_host))
        .route("/v1/task/:id/hosts", get(handlers::list_task_hosts))
        .route("/v1/task/:id/hosts/status", get(handlers::list_host_status))
        .route("/v1/task/:id/hosts/waiting", get(handlers::list_waiting_hosts))
        .route("/v1/task/:id/counts", get(handlers::host_counts))
        // Observability
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
