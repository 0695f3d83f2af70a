/// Signup and settings endpoints
use crate::{
    account::{
        validation_message, AvailabilityQuery, AvailabilityResponse, SettingsUpdateRequest,
        SettingsUpdateResponse, SignupRequest, SignupResponse,
    },
    auth::AuthContext,
    context::AppContext,
    error::{CoreError, CoreResult},
    tokens::TokenKind,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/signup", post(signup))
        .route("/api/signup/availability", get(availability))
        .route("/api/settings", post(update_settings))
}

/// Signup endpoint
async fn signup(
    State(ctx): State<AppContext>,
    Json(req): Json<SignupRequest>,
) -> CoreResult<Json<SignupResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(validation_message(&e)))?;

    let identity = ctx.account_manager.create_account(&req).await?;

    // Everything after the account exists is best-effort delivery.
    if let Err(e) = ctx
        .mailer
        .send_welcome_email(&identity.email, &identity.username, &req.first_name)
        .await
    {
        tracing::warn!("Failed to send welcome email to {}: {}", identity.email, e);
    }

    match ctx.token_store.issue(identity.id, TokenKind::Verify).await {
        Ok(token) => {
            if let Err(e) = ctx
                .mailer
                .send_verification_email(
                    &identity.email,
                    &identity.username,
                    &token,
                    &ctx.service_url(),
                )
                .await
            {
                tracing::warn!(
                    "Failed to send verification email to {}: {}",
                    identity.email,
                    e
                );
            }
        }
        Err(e) => {
            tracing::warn!("Failed to issue verification token: {}", e);
        }
    }

    Ok(Json(SignupResponse {
        identity_id: identity.id,
        username: identity.username,
    }))
}

/// Username/email availability pre-check used by the signup form
async fn availability(
    State(ctx): State<AppContext>,
    Query(query): Query<AvailabilityQuery>,
) -> CoreResult<Json<AvailabilityResponse>> {
    let username_taken = match query.username.as_deref() {
        Some(username) if !username.is_empty() => {
            Some(ctx.account_manager.username_exists(username, None).await?)
        }
        _ => None,
    };

    let email_taken = match query.email.as_deref() {
        Some(email) if !email.is_empty() => {
            Some(ctx.account_manager.email_exists(email, None).await?)
        }
        _ => None,
    };

    Ok(Json(AvailabilityResponse {
        username_taken,
        email_taken,
    }))
}

/// Settings update endpoint: applies to the authenticated identity only
async fn update_settings(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SettingsUpdateRequest>,
) -> CoreResult<Json<SettingsUpdateResponse>> {
    let changes = ctx
        .account_manager
        .update_settings(auth.identity_id, &req)
        .await?;

    if !changes.is_empty() {
        let identity = ctx.account_manager.get_identity(auth.identity_id).await?;
        let profile = ctx.account_manager.get_profile(auth.identity_id).await?;

        if let Err(e) = ctx
            .mailer
            .send_settings_change_email(&profile.email, &identity.username, &changes)
            .await
        {
            tracing::warn!(
                "Failed to send settings change email to {}: {}",
                profile.email,
                e
            );
        }
    }

    Ok(Json(SettingsUpdateResponse { changes }))
}
