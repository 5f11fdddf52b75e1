//! HTTP Error Mapping
//!
//! Maps application errors to status codes and a `{error, message}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backy_core::error::AppError;
use serde::Serialize;
use tracing::{debug, error};

/// Error kinds reported in the `error` field
pub mod kind {
    pub const VALIDATION: &str = "validation";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const PROTECTED: &str = "protected";
    pub const COMMAND_FAILED: &str = "command_failed";
    pub const CONSISTENCY: &str = "consistency";
    pub const STORAGE: &str = "storage";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Status code and kind for an AppError
pub fn classify(err: &AppError) -> (StatusCode, &'static str) {
    match err {
        AppError::Conflict(_) => (StatusCode::CONFLICT, kind::CONFLICT),
        AppError::NotFound(_) => (StatusCode::NOT_FOUND, kind::NOT_FOUND),
        AppError::Validation(_) => (StatusCode::BAD_REQUEST, kind::VALIDATION),
        AppError::Protected(_) => (StatusCode::INTERNAL_SERVER_ERROR, kind::PROTECTED),
        AppError::CommandFailed(_) | AppError::Execution(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, kind::COMMAND_FAILED)
        }
        AppError::Consistency(_) => (StatusCode::INTERNAL_SERVER_ERROR, kind::CONSISTENCY),
        AppError::Storage(_) | AppError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, kind::STORAGE)
        }
        AppError::Domain(_) | AppError::Config(_) | AppError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, kind::INTERNAL)
        }
    }
}

/// Caller-facing message, without the variant prefix where there is one
fn message(err: &AppError) -> String {
    match err {
        AppError::Validation(m)
        | AppError::NotFound(m)
        | AppError::Conflict(m)
        | AppError::CommandFailed(m)
        | AppError::Consistency(m)
        | AppError::Protected(m)
        | AppError::Storage(m)
        | AppError::Config(m)
        | AppError::Internal(m) => m.clone(),
        other => other.to_string(),
    }
}

/// Axum-facing wrapper so handlers can use `?` on core results
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = classify(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: kind,
            message: message(&self.0),
        };
        (status, Json(body)).into_response()
    }
}
