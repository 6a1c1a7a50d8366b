//! Error types for dropout-dash
//!
//! Every handler error renders as `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dropout_common::dataset::analytics::AnalyticsError;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Model or dataset not loaded (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Dashboard aggregation error
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// dropout-common error
    #[error("Common error: {0}")]
    Common(#[from] dropout_common::Error),
}

fn analytics_status(err: &AnalyticsError) -> (StatusCode, &'static str) {
    match err {
        AnalyticsError::UnknownColumn(_) => (StatusCode::NOT_FOUND, "UNKNOWN_COLUMN"),
        AnalyticsError::UnsupportedColumn { .. } => (StatusCode::BAD_REQUEST, "UNSUPPORTED_COLUMN"),
        AnalyticsError::MissingLabelColumn | AnalyticsError::NotEnoughNumericColumns(_) => {
            (StatusCode::CONFLICT, "DATASET_INCOMPATIBLE")
        }
    }
}

fn common_status(err: &dropout_common::Error) -> (StatusCode, &'static str) {
    use dropout_common::Error;
    match err {
        Error::Feature(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        Error::Schema(_) => (StatusCode::UNPROCESSABLE_ENTITY, "SCHEMA_MISMATCH"),
        Error::Model(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_ERROR"),
        Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Analytics(ref err) => {
                let (status, code) = analytics_status(err);
                (status, code, err.to_string())
            }
            ApiError::Common(ref err) => {
                let (status, code) = common_status(err);
                (status, code, err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
