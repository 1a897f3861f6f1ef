//! Machine-to-machine endpoints used by the potting device itself.
//!
//! The device polls the run signal and reports heartbeats. Heartbeats share their path
//! with the liveness read in [`crate::http::api`].

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::get,
};

use potline_common::HeartbeatReport;

use crate::{
    app::AppState,
    http::error::{ApiResult, MessageBody},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/device-control", get(get_device_control))
}

#[axum::debug_handler]
pub(crate) async fn record_heartbeat(
    State(state): State<AppState>,
    body: Result<Json<HeartbeatReport>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(report) = body?;
    state.controller.record_heartbeat(report).await?;
    Ok(MessageBody::new("Heartbeat recorded"))
}

/// The run signal the device follows.
#[axum::debug_handler]
async fn get_device_control(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.controller.device_signal().await?))
}
