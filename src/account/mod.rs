/// Account types and services: signup, credential checks, sessions
pub mod guard;
pub mod manager;

pub use guard::{CredentialGuard, RequestContext};
pub use manager::AccountManager;

use crate::db::models::Session;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Validated session info extracted from an access token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub identity_id: i64,
    pub session_id: String,
}

/// Successful authentication outcome
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub identity_id: i64,
    pub session: Session,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username or email
    #[validate(length(min = 3, max = 150))]
    pub identifier: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identity_id: i64,
    pub access_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 3, max = 30))]
    pub first_name: String,
    #[validate(length(min = 3, max = 30))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
}

/// Signup response
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub identity_id: i64,
    pub username: String,
}

/// Pre-check for username/email availability during signup
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub username_taken: Option<bool>,
    pub email_taken: Option<bool>,
}

/// Settings update: every field optional, password change requires all
/// three password fields
#[derive(Debug, Deserialize, Default)]
pub struct SettingsUpdateRequest {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

/// Settings update result: human-readable change descriptions
#[derive(Debug, Serialize)]
pub struct SettingsUpdateResponse {
    pub changes: Vec<String>,
}

/// Flatten validator errors into a single client-facing message
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let detail = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "is invalid".to_string());
            format!("{} {}", field, detail)
        })
        .collect();
    parts.sort();
    parts.join("; ")
}
