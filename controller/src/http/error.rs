//! Mapping of controller errors onto HTTP responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::controller::ControlError;

/// Body of every error and of plain acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub(crate) fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Response-side wrapper so handlers can use `?` on controller results.
#[derive(Debug)]
pub(crate) struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(value: ControlError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self(ControlError::Validation(value.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ControlError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ControlError::Conflict(ref conflict) => (StatusCode::BAD_REQUEST, conflict.to_string()),
            ControlError::InvalidTransition(ref invalid) => {
                (StatusCode::BAD_REQUEST, invalid.to_string())
            }
            ControlError::NotFound(_) => (StatusCode::NOT_FOUND, "Batch not found".to_owned()),
            ControlError::Store(ref e) => {
                error!(?e, "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal storage error".to_owned(),
                )
            }
        };
        (status, MessageBody::new(message)).into_response()
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;
