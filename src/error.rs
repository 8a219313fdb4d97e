//! Error types for the meta-agent core.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single tool invocation. Both variants are captured into a
/// failed trace by the task runner; they never abort the task.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool cannot run at all, e.g. a required credential is missing.
    #[error("{0}")]
    Unavailable(String),

    /// The tool ran and failed: bad input or a provider error.
    #[error("{0}")]
    Execution(String),
}

/// Failure of a language model round-trip. Every caller has a deterministic
/// fallback path, so these are logged but never surfaced on their own.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no language model is configured")]
    Unavailable,

    #[error("model provider error: {0}")]
    Provider(String),

    #[error("model returned an empty response")]
    Empty,

    #[error("failed to parse model response: {0}")]
    Parse(String),
}

/// Registry failures. `NotFound` maps to 404; `Persistence` is the only
/// fatal outcome of an otherwise-successful mutation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("agent {0} not found")]
    NotFound(String),

    #[error("failed to persist agent snapshot: {0}")]
    Persistence(String),
}

/// HTTP-facing error with a status code and message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
            StoreError::Persistence(_) => {
                tracing::error!(error = %err, "store mutation failed");
                Self::internal(err.to_string())
            }
        }
    }
}
