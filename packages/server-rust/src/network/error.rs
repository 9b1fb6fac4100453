//! Error type returned by the record handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::pipeline::IngestError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Unparseable or invalid record payload.
    #[error("invalid record: {}", .0.join("; "))]
    InvalidBody(Vec<String>),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// The server is draining or stopped.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) | Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidBody(errors) => json!({ "errors": errors }),
            Self::InvalidQuery(message) | Self::Unavailable(message) => json!({ "error": message }),
            Self::Storage(err) => {
                error!(kind = err.kind(), error = %err, "storage request failed");
                json!({ "error": "storage unavailable" })
            }
        };
        (status, Json(body)).into_response()
    }
}
