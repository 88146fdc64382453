//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every endpoint returns the
//! same `{code, message}` shape.
//!
//! # Key invariants and assumptions
//! - `duplicate_issuance` (409) and `verification_limit_reached` (429) are
//!   final for the request; `internal` (500) may be retried.
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use anontoken_keys::KeyError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use verification::api::error::ApiError;
/// use verification::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::CONFLICT,
///     body: ErrorResponse {
///         code: "duplicate_issuance".to_string(),
///         message: "already issued".to_string(),
///         request_id: None,
///     },
/// };
/// assert_eq!(err.status, StatusCode::CONFLICT);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

/// 404 for a feature this deployment does not enable.
pub fn api_not_enabled(message: &str) -> ApiError {
    // Use NOT_FOUND to avoid exposing disabled feature presence.
    api_error(StatusCode::NOT_FOUND, "not_enabled", message)
}

/// 409 with a caller-provided conflict code.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

pub fn api_too_many_requests(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::TOO_MANY_REQUESTS, code, message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// 500 from a store error; the error itself is only logged.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "verification storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// 500 from a key-material error; the error itself is only logged.
pub fn api_key_error(message: &str, err: &KeyError) -> ApiError {
    tracing::error!(error = %err, "key material error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}
