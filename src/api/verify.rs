/// Email verification endpoints
use crate::{context::AppContext, error::CoreResult, tokens::TokenKind};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::json;

/// Build verification routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/api/verify-email/:token",
        get(check_verification_token).post(complete_verification),
    )
}

/// Read-only validity check before presenting the confirmation page
async fn check_verification_token(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    ctx.token_store.peek(&token, TokenKind::Verify).await?;

    Ok(Json(json!({ "valid": true })))
}

/// Complete verification: mark the email verified, then consume
async fn complete_verification(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    let identity_id = ctx.token_store.peek(&token, TokenKind::Verify).await?;

    ctx.account_manager.mark_email_verified(identity_id).await?;
    ctx.token_store.consume(&token, TokenKind::Verify).await?;

    let identity = ctx.account_manager.get_identity(identity_id).await?;
    let profile = ctx.account_manager.get_profile(identity_id).await?;
    if let Err(e) = ctx
        .mailer
        .send_email_verified_confirmation(&profile.email, &identity.username)
        .await
    {
        tracing::warn!(
            "Failed to send verification confirmation email to {}: {}",
            profile.email,
            e
        );
    }

    Ok(Json(json!({ "success": true })))
}
