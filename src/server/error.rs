//! API error types and JSON response formatting.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::KvError;

/// Message returned for every server-side failure.
const INTERNAL_MESSAGE: &str = "Internal server error";

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details in the response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that converts to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Request body is not valid JSON or lacks a required field.
    pub fn malformed_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MALFORMED_REQUEST", "Incorrect body")
    }

    /// Key already exists error.
    pub fn key_exists(key: &str) -> Self {
        Self::new(StatusCode::CONFLICT, "KEY_EXISTS", "Key already exists")
            .with_details(serde_json::json!({ "key": key }))
    }

    /// Key not found error.
    pub fn key_not_found(key: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "KEY_NOT_FOUND",
            format!("Key '{}' not found", key),
        )
        .with_details(serde_json::json!({ "key": key }))
    }

    /// Stored value cannot be represented as JSON.
    pub fn non_string_key() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "NON_STRING_KEY", "Key is not a string")
    }

    /// Internal server error.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL_MESSAGE)
    }

    /// Store did not answer.
    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", "Store is unavailable")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log server errors at error level, client errors at debug level
        if self.status.is_server_error() {
            error!(
                status = %self.status.as_u16(),
                code = %self.code,
                message = %self.message,
                "server error response"
            );
        } else if self.status.is_client_error() {
            debug!(
                status = %self.status.as_u16(),
                code = %self.code,
                message = %self.message,
                "client error response"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        match &err {
            KvError::MalformedRequest(reason) => {
                debug!(reason = %reason, "malformed request body");
                Self::malformed_request()
            }
            KvError::Duplicate(key) => Self::key_exists(key),
            KvError::NotFound(key) => Self::key_not_found(key),
            KvError::NonStringKey(e) => {
                error!(error = %e, "stored value is not JSON-compatible");
                Self::non_string_key()
            }
            // The cause stays in the logs; callers only see a fixed message.
            KvError::Internal(e) => {
                error!(error = %e, "store failure");
                Self::internal()
            }
        }
    }
}
