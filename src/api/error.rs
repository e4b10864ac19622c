//! Error type returned by API handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::events::EventError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid event batch: {0}")]
    InvalidEvents(#[from] EventError),

    #[error("empty event batch")]
    EmptyBatch,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidEvents(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_EVENTS"),
            ApiError::EmptyBatch => (StatusCode::BAD_REQUEST, "EMPTY_BATCH"),
            ApiError::Internal(_) | ApiError::Task(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = json!({
            "error": { "code": code, "message": self.to_string() },
            "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
        });
        (status, Json(body)).into_response()
    }
}
