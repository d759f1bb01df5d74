//! HTTP error handling and response types.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::engine::EngineError;
use crate::model::WindowError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Engine rejected the operation
    Engine(EngineError),
    /// Malformed path, query string or body
    BadRequest(String),
    /// Missing or unknown bearer token
    Unauthorized,
    /// Token is valid but its role lacks the permission
    Forbidden(Role),
}

fn engine_status(e: &EngineError) -> (StatusCode, &'static str) {
    match e {
        EngineError::InvalidWindow(_) => (StatusCode::BAD_REQUEST, "INVALID_WINDOW"),
        EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "LIMIT_EXCEEDED"),
        EngineError::TheatreNotFound(_) => (StatusCode::NOT_FOUND, "THEATRE_NOT_FOUND"),
        EngineError::SurgeryNotFound(_) => (StatusCode::NOT_FOUND, "SURGERY_NOT_FOUND"),
        EngineError::TheatreExists(_) => (StatusCode::CONFLICT, "THEATRE_EXISTS"),
        EngineError::SurgeryExists(_) => (StatusCode::CONFLICT, "SURGERY_EXISTS"),
        EngineError::Conflict { .. } => (StatusCode::CONFLICT, "SCHEDULE_CONFLICT"),
        EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        EngineError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Engine(e) => {
                let (status, code) = engine_status(&e);
                if e.is_retryable() {
                    tracing::error!("storage failure: {e}");
                }
                (status, ApiError::new(code, e.to_string()))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg)),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("UNAUTHORIZED", "missing or invalid bearer token"),
            ),
            AppError::Forbidden(role) => (
                StatusCode::FORBIDDEN,
                ApiError::new("FORBIDDEN", format!("role {role} may not perform this action")),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<WindowError> for AppError {
    fn from(err: WindowError) -> Self {
        AppError::Engine(err.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}
