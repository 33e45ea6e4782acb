use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson, Response},
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for HTTP status code mapping
#[derive(Error, Debug)]
pub enum AppError {
    /// Another peer holds the admission slot
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("File '{filename}' already exists")]
    FileExists { filename: String, path: PathBuf },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for unexpected errors - logs full context internally
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, "busy", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Cancelled(msg) => (StatusCode::CONFLICT, "cancelled", msg),
            AppError::FileExists { filename, path } => {
                // Flat body so clients can show the conflicting path directly
                let body = AxumJson(json!({
                    "error": "file_exists",
                    "message": format!("File '{}' already exists", filename),
                    "filename": filename,
                    "path": path.display().to_string(),
                }));
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::Internal(ref err) => {
                tracing::error!(error = ?err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = AxumJson(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
