//! Task host handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use fleetrun_core::{
    ApiResponse, DoneReport, HostCounts, HostKey, OutputUpdate, TaskHost, TaskId,
};

use crate::error::StatusError;
use crate::http::responses::{MarkDoneQuery, WaitingQuery};
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, StatusError>;

fn ok<T>(dat: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(dat)))
}

fn empty() -> ApiResult<()> {
    Ok(Json(ApiResponse::empty()))
}

/// Create one record.
pub async fn create_task_host(
    State(state): State<Arc<AppState>>,
    Json(record): Json<TaskHost>,
) -> ApiResult<()> {
    state.service.create(&record).await?;
    empty()
}

/// Upsert a batch; `dat` maps failed keys to their error.
pub async fn upsert_task_hosts(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<TaskHost>>,
) -> ApiResult<HashMap<String, String>> {
    ok(state.service.upserts(&records).await?)
}

/// Accept a completion report.
pub async fn mark_done(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarkDoneQuery>,
    Json(report): Json<DoneReport>,
) -> ApiResult<()> {
    state.service.mark_done(&report, query.edge_alert).await?;
    empty()
}

/// Start hosts; `dat` is the attempt clock.
pub async fn run_task_hosts(
    State(state): State<Arc<AppState>>,
    Json(hosts): Json<Vec<HostKey>>,
) -> ApiResult<i64> {
    ok(state.service.bulk_start(&hosts).await?)
}

/// Replace the output of a running host.
pub async fn update_output(
    State(state): State<Arc<AppState>>,
    Json(update): Json<OutputUpdate>,
) -> ApiResult<()> {
    state.service.real_time_update_output(&update).await?;
    empty()
}

/// Record of one host; `dat` is null when absent.
pub async fn get_task_host(
    State(state): State<Arc<AppState>>,
    Path((id, host)): Path<(i64, String)>,
) -> ApiResult<Option<TaskHost>> {
    ok(state.service.get(TaskId::new(id), &host).await?)
}

pub async fn list_task_hosts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<TaskHost>> {
    ok(state.service.list_all(TaskId::new(id)).await?)
}

/// Every host without captured output.
pub async fn list_host_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<TaskHost>> {
    ok(state.service.status_only(TaskId::new(id)).await?)
}

pub async fn list_waiting_hosts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<WaitingQuery>,
) -> ApiResult<Vec<TaskHost>> {
    ok(state
        .service
        .list_waiting(TaskId::new(id), query.limit)
        .await?)
}

pub async fn host_counts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<HostCounts> {
    ok(state.service.counts(TaskId::new(id)).await?)
}
