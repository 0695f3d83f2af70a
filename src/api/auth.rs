/// Login, logout, and verification-resend endpoints
use crate::{
    account::{LoginRequest, LoginResponse, RequestContext},
    api::middleware::client_ip,
    auth::AuthContext,
    context::AppContext,
    error::{CoreError, CoreResult},
    tokens::TokenKind,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/resend-verification", post(resend_verification))
}

/// Login endpoint
///
/// The per-address rate ceiling has already run in middleware by the
/// time this handler sees the request.
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> CoreResult<Json<LoginResponse>> {
    let request_ctx = RequestContext {
        source_ip: client_ip(&headers),
    };

    let success = ctx.credential_guard.authenticate(&req, &request_ctx).await?;

    Ok(Json(LoginResponse {
        identity_id: success.identity_id,
        access_token: success.session.access_token,
        expires_at: success.session.expires_at,
    }))
}

/// Logout endpoint
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> CoreResult<Json<serde_json::Value>> {
    ctx.account_manager.delete_session(&auth.session.session_id).await?;

    tracing::info!("Identity {} logged out", auth.identity_id);

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ResendVerificationRequest {
    identity_id: i64,
}

/// Re-issue a verification token and send the email again
async fn resend_verification(
    State(ctx): State<AppContext>,
    Json(req): Json<ResendVerificationRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    let identity = ctx.account_manager.get_identity(req.identity_id).await?;
    let profile = ctx.account_manager.get_profile(req.identity_id).await?;

    if profile.email_verified {
        return Err(CoreError::Validation(
            "Email is already verified".to_string(),
        ));
    }

    let token = ctx.token_store.issue(identity.id, TokenKind::Verify).await?;

    if let Err(e) = ctx
        .mailer
        .send_verification_email(&profile.email, &identity.username, &token, &ctx.service_url())
        .await
    {
        tracing::warn!(
            "Failed to resend verification email to {}: {}",
            profile.email,
            e
        );
    }

    Ok(Json(json!({ "success": true })))
}
