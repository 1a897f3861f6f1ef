//! Dashboard facing endpoints: batches, machine state and device liveness.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, put},
};
use hyper::StatusCode;
use serde::Deserialize;

use crate::{
    app::{
        AppState,
        model::{NewBatch, ResourceUpdate},
    },
    http::{
        error::{ApiResult, MessageBody},
        m2m,
    },
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/batches", get(list_batches).post(create_batch))
        .route(
            "/batches/{id}",
            get(get_batch).put(record_progress).delete(delete_batch),
        )
        .route("/batches/{id}/cancel", put(cancel_batch))
        .route(
            "/machine-state",
            get(get_machine_state).put(update_machine_state),
        )
        .route(
            "/device-status",
            get(get_device_status).put(m2m::record_heartbeat),
        )
}

/// Progress report sent by the machine after potting.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressReport {
    #[serde(default)]
    pots_increment: Option<i64>,
}

#[axum::debug_handler]
async fn list_batches(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.list_batches().await?))
}

#[axum::debug_handler]
async fn create_batch(
    State(state): State<AppState>,
    body: Result<Json<NewBatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = body?;
    let batch = state.controller.create_batch(draft).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

#[axum::debug_handler]
async fn get_batch(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.batch(&id).await?))
}

#[axum::debug_handler]
async fn record_progress(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<ProgressReport>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(report) = body?;
    let batch = state
        .controller
        .record_progress(&id, report.pots_increment)
        .await?;
    Ok(Json(batch))
}

#[axum::debug_handler]
async fn delete_batch(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.controller.delete_batch(&id).await?;
    Ok(MessageBody::new("Batch Deleted Successfully"))
}

#[axum::debug_handler]
async fn cancel_batch(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.cancel_batch(&id).await?))
}

#[axum::debug_handler]
async fn get_machine_state(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.machine_state().await?))
}

#[axum::debug_handler]
async fn update_machine_state(
    State(state): State<AppState>,
    body: Result<Json<ResourceUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = body?;
    Ok(Json(state.controller.update_resource_levels(update).await?))
}

/// Returns whether the device is online, judged by its last heartbeat.
#[axum::debug_handler]
async fn get_device_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.liveness().await?))
}
