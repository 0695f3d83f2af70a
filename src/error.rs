/// Unified error types for the Skytrade core
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Validation errors (malformed input, client-fixable)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic credential failure. Never reveals which of
    /// identifier/secret was wrong.
    #[error("Invalid username, email, or password")]
    InvalidCredentials,

    /// Account locked after repeated failures. Terminal until an
    /// out-of-band unlock.
    #[error("Account is locked due to multiple failed login attempts")]
    AccountLocked,

    /// Credentials were correct but the email is unverified. Carries the
    /// identity id so the caller can offer a resend action.
    #[error("Email address is not verified")]
    EmailNotVerified { identity_id: i64 },

    /// Authentication errors (missing/invalid session)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Identity/resource mismatch
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// No token record matches
    #[error("Invalid or unknown token")]
    TokenNotFound,

    /// Token past its validity window; the record has been deleted
    #[error("Token has expired")]
    TokenExpired,

    /// Missing identity/profile
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g. duplicate username or email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<i64>,
}

/// Convert CoreError to HTTP response
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_code, identity_id) = match &self {
            CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest", None),
            CoreError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "InvalidCredentials", None)
            }
            CoreError::AccountLocked => (StatusCode::FORBIDDEN, "AccountLocked", None),
            CoreError::EmailNotVerified { identity_id } => (
                StatusCode::FORBIDDEN,
                "EmailNotVerified",
                Some(*identity_id),
            ),
            CoreError::Authentication(_) => {
                (StatusCode::UNAUTHORIZED, "AuthenticationRequired", None)
            }
            CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden", None),
            CoreError::TokenNotFound => (StatusCode::NOT_FOUND, "TokenNotFound", None),
            CoreError::TokenExpired => (StatusCode::GONE, "TokenExpired", None),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", None),
            CoreError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", None),
            CoreError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded", None)
            }
            CoreError::Database(_) | CoreError::Internal(_) | CoreError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", None)
            }
        };

        let message = match &self {
            // Don't leak details
            CoreError::Database(_) | CoreError::Internal(_) | CoreError::Io(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            identity_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
