/// Password reset endpoints: request, validity check, completion
use crate::{
    context::AppContext,
    error::{CoreError, CoreResult},
    tokens::TokenKind,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build password reset routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/password-reset", post(request_reset))
        .route(
            "/api/password-reset/:token",
            get(check_reset_token).post(complete_reset),
        )
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    identifier: String,
}

/// Start a password reset for a username or email
async fn request_reset(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    let identity = ctx
        .account_manager
        .get_identity_by_identifier(req.identifier.trim())
        .await?;

    // A locked account stays locked through reset attempts as well.
    let profile = ctx.account_manager.get_profile(identity.id).await?;
    if profile.is_locked {
        return Err(CoreError::AccountLocked);
    }

    let token = ctx.token_store.issue(identity.id, TokenKind::Reset).await?;

    if let Err(e) = ctx
        .mailer
        .send_password_reset_email(&profile.email, &identity.username, &token, &ctx.service_url())
        .await
    {
        tracing::warn!(
            "Failed to send password reset email to {}: {}",
            profile.email,
            e
        );
    }

    Ok(Json(json!({ "success": true })))
}

/// Read-only validity check before presenting the reset form
async fn check_reset_token(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    ctx.token_store.peek(&token, TokenKind::Reset).await?;

    Ok(Json(json!({ "valid": true })))
}

#[derive(Debug, Deserialize)]
struct CompleteResetRequest {
    new_password: String,
    confirm_password: String,
}

/// Complete a reset: confirmation equality gates token consumption
async fn complete_reset(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
    Json(req): Json<CompleteResetRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    if req.new_password != req.confirm_password {
        return Err(CoreError::Validation("Passwords do not match".to_string()));
    }
    if !(8..=128).contains(&req.new_password.len()) {
        return Err(CoreError::Validation(
            "Password must be between 8 and 128 characters".to_string(),
        ));
    }

    let identity_id = ctx.token_store.consume(&token, TokenKind::Reset).await?;

    ctx.account_manager
        .update_password(identity_id, &req.new_password)
        .await?;

    // Existing sessions are invalid once the secret changes.
    ctx.account_manager.delete_sessions_for(identity_id).await?;

    tracing::info!("Password reset completed for identity {}", identity_id);

    let identity = ctx.account_manager.get_identity(identity_id).await?;
    let profile = ctx.account_manager.get_profile(identity_id).await?;
    if let Err(e) = ctx
        .mailer
        .send_password_reset_confirmation(&profile.email, &identity.username)
        .await
    {
        tracing::warn!(
            "Failed to send reset confirmation email to {}: {}",
            profile.email,
            e
        );
    }

    Ok(Json(json!({ "success": true })))
}
