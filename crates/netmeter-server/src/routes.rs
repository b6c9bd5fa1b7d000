//! HTTP API.
//!
//! Reports are served straight from cached artifact bytes; the server
//! never aggregates inline. A canonical key that has no artifact yet is a
//! plain 404 (the scheduler owns canonical generation), a custom key
//! enqueues generation and answers 202 until the artifact lands.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use netmeter_backup::{clear_restore_marker, read_restore_marker};
use netmeter_report::{JobStatus, Period, wait_ready};

use crate::groups::Group;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/report/{key}", get(get_report))
        .route("/api/report/custom", post(post_custom))
        .route("/api/months", get(get_months))
        .route("/api/restore-status", get(get_restore_status))
        .route("/api/restore-status/clear", post(clear_restore_status))
        .route("/api/groups", get(get_groups).post(post_group))
        .route("/api/groups/{name}", delete(delete_group))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

fn artifact_response(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        bytes,
    )
        .into_response()
}

async fn get_report(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let period = match Period::from_key(&key) {
        Ok(period) => period,
        Err(e) => return bad_request(e.to_string()),
    };
    let key = period.key();

    match state.cache.load_bytes(&key).await {
        Ok(Some(bytes)) => return artifact_response(bytes),
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    if period.is_canonical() {
        // The scheduler owns canonical artifacts; a miss means the period
        // has no data published yet, never a reason to aggregate inline.
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no report for '{key}'") })),
        )
            .into_response();
    }

    state.jobs.request(period);
    let status = wait_ready(
        &state.jobs,
        &key,
        Duration::from_secs(state.config.report.job_poll_secs),
        Duration::from_secs(state.config.report.job_wait_secs),
    )
    .await;
    match status {
        JobStatus::Ready => match state.cache.load_bytes(&key).await {
            Ok(Some(bytes)) => artifact_response(bytes),
            Ok(None) => internal_error("artifact vanished after generation"),
            Err(e) => internal_error(e),
        },
        JobStatus::Pending => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "pending", "key": key })),
        )
            .into_response(),
        JobStatus::Failed => {
            // The worker logged the failure and any previous artifact is
            // intact; the consumer only ever sees not-ready and may retry.
            error!(key = %key, "custom report generation failed");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "pending", "key": key })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CustomRequest {
    start: String,
    end: String,
}

async fn post_custom(
    State(state): State<AppState>,
    Json(req): Json<CustomRequest>,
) -> Response {
    let period = match Period::custom(&req.start, &req.end) {
        Ok(period) => period,
        Err(e) => return bad_request(e.to_string()),
    };
    let key = period.key();
    // Idempotent: a duplicate of an in-flight request coalesces, an
    // already-cached artifact just re-announces its key.
    if !state.cache.contains(&key) {
        state.jobs.request(period);
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "key": key })),
    )
        .into_response()
}

async fn get_months(State(state): State<AppState>) -> Response {
    match state.cache.list_available_months().await {
        Ok(months) => Json(months).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_restore_status(State(state): State<AppState>) -> Response {
    match read_restore_marker(&state.config.paths.data_dir) {
        Some(status) => Json(json!({
            "restored": true,
            "detected_at": status.detected_at,
            "restored_at": status.restored_at,
            "source": status.source,
        }))
        .into_response(),
        None => Json(json!({ "restored": false })).into_response(),
    }
}

async fn clear_restore_status(State(state): State<AppState>) -> Response {
    match clear_restore_marker(&state.config.paths.data_dir) {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => Json(json!({
            "success": true,
            "message": "no restore status to clear",
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_groups(State(state): State<AppState>) -> Response {
    Json(state.groups.list()).into_response()
}

async fn post_group(State(state): State<AppState>, Json(group): Json<Group>) -> Response {
    if group.name.trim().is_empty() {
        return bad_request("group name must not be empty".to_string());
    }
    match state.groups.upsert(group) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn delete_group(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.groups.remove(&name) {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no group named '{name}'") })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}
