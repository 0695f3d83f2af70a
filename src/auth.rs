/// Authentication extractors
use crate::{
    account::ValidatedSession,
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::CoreError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity_id: i64,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| CoreError::Authentication("Missing authorization header".to_string()))?;

        let session = state
            .account_manager
            .validate_access_token(&token)
            .await?;

        Ok(AuthContext {
            identity_id: session.identity_id,
            session,
        })
    }
}
