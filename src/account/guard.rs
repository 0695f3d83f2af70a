/// Credential guard: authentication with brute-force lockout
///
/// Checks run in a fixed order: lock state before secret verification,
/// counter/lock persistence before any notification dispatch.

use crate::{
    account::{AccountManager, AuthSuccess, LoginRequest, validation_message},
    config::ServerConfig,
    error::{CoreError, CoreResult},
    geo::{GeoInfo, GeoLocator},
    mailer::Mailer,
    metrics,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use validator::Validate;

/// Failed attempts at which the account locks
pub const LOCKOUT_THRESHOLD: i64 = 5;

/// Per-request context captured at the HTTP boundary
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub source_ip: Option<String>,
}

/// Credential guard service
pub struct CredentialGuard {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    manager: Arc<AccountManager>,
    geo: Arc<GeoLocator>,
    mailer: Arc<Mailer>,
}

impl CredentialGuard {
    pub fn new(
        db: SqlitePool,
        config: Arc<ServerConfig>,
        manager: Arc<AccountManager>,
        geo: Arc<GeoLocator>,
        mailer: Arc<Mailer>,
    ) -> Self {
        Self {
            db,
            config,
            manager,
            geo,
            mailer,
        }
    }

    /// Authenticate an identifier + password pair
    ///
    /// Failure responses never reveal which of the two was wrong. A locked
    /// account short-circuits before password verification and leaves the
    /// attempt counter untouched.
    pub async fn authenticate(
        &self,
        req: &LoginRequest,
        ctx: &RequestContext,
    ) -> CoreResult<AuthSuccess> {
        req.validate()
            .map_err(|e| CoreError::Validation(validation_message(&e)))?;

        let Some((identity, profile)) =
            self.manager.resolve_login_identifier(&req.identifier).await?
        else {
            metrics::LOGIN_ATTEMPTS_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            return Err(CoreError::InvalidCredentials);
        };

        if profile.is_locked {
            tracing::info!("Rejected login for locked identity {}", identity.id);
            metrics::LOGIN_ATTEMPTS_TOTAL.with_label_values(&["locked"]).inc();
            return Err(CoreError::AccountLocked);
        }

        let valid = super::manager::verify_password(&req.password, &identity.password_hash)?;

        if !valid {
            return self.register_failure(&identity.username, &profile.email, identity.id, ctx).await;
        }

        if !profile.email_verified {
            metrics::LOGIN_ATTEMPTS_TOTAL
                .with_label_values(&["email_not_verified"])
                .inc();
            return Err(CoreError::EmailNotVerified {
                identity_id: identity.id,
            });
        }

        sqlx::query("UPDATE profile SET login_attempts = 0 WHERE identity_id = ?1")
            .bind(identity.id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        let session = self.manager.establish_session(identity.id).await?;

        tracing::info!("Identity {} logged in", identity.id);
        metrics::LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();

        Ok(AuthSuccess {
            identity_id: identity.id,
            session,
        })
    }

    /// Record a failed attempt; transition to locked at the threshold
    async fn register_failure(
        &self,
        username: &str,
        email: &str,
        identity_id: i64,
        ctx: &RequestContext,
    ) -> CoreResult<AuthSuccess> {
        // Concurrent failures must serialize the read-increment-write, so
        // the counter bumps in a single statement.
        let attempts: i64 = sqlx::query_scalar(
            "UPDATE profile SET login_attempts = login_attempts + 1
             WHERE identity_id = ?1
             RETURNING login_attempts",
        )
        .bind(identity_id)
        .fetch_one(&self.db)
        .await
        .map_err(CoreError::Database)?;

        tracing::info!(
            "Failed login attempt {} for identity {}",
            attempts,
            identity_id
        );

        if attempts < LOCKOUT_THRESHOLD {
            metrics::LOGIN_ATTEMPTS_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            return Err(CoreError::InvalidCredentials);
        }

        // Geolocation is best-effort: any failure degrades to a placeholder
        // and never blocks the lock transition.
        let geo = match ctx.source_ip.as_deref() {
            Some(ip) => self.geo.lookup(ip).await,
            None => GeoInfo::unknown(),
        };

        sqlx::query(
            "UPDATE profile
             SET is_locked = 1,
                 last_failed_ip = ?1,
                 last_failed_location = ?2,
                 last_failed_latitude = ?3,
                 last_failed_longitude = ?4
             WHERE identity_id = ?5",
        )
        .bind(ctx.source_ip.as_deref())
        .bind(&geo.location)
        .bind(geo.latitude)
        .bind(geo.longitude)
        .bind(identity_id)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        tracing::warn!(
            "Identity {} locked after {} failed attempts (ip: {}, location: {})",
            identity_id,
            attempts,
            ctx.source_ip.as_deref().unwrap_or("unknown"),
            geo.location
        );
        metrics::LOCKOUTS_TOTAL.inc();
        metrics::LOGIN_ATTEMPTS_TOTAL.with_label_values(&["locked"]).inc();

        // Lock state is already persisted; a failed send only gets logged.
        if let Err(e) = self
            .mailer
            .send_lockout_email(
                email,
                username,
                ctx.source_ip.as_deref().unwrap_or("unknown"),
                &geo.location,
                &self.config.service.support_email,
            )
            .await
        {
            tracing::warn!("Failed to send lockout email to {}: {}", email, e);
        }

        Err(CoreError::AccountLocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SignupRequest;
    use crate::config::test_support::test_config;
    use crate::db;

    async fn guard_fixture() -> (CredentialGuard, Arc<AccountManager>, sqlx::SqlitePool) {
        let pool = db::test_pool().await;
        let config = Arc::new(test_config());
        let manager = Arc::new(AccountManager::new(pool.clone(), config.clone()));
        let geo = Arc::new(GeoLocator::new(&config.geolocation).unwrap());
        let mailer = Arc::new(Mailer::new(None).unwrap());
        let guard = CredentialGuard::new(pool.clone(), config, manager.clone(), geo, mailer);
        (guard, manager, pool)
    }

    async fn create_verified(manager: &AccountManager, pool: &sqlx::SqlitePool) -> i64 {
        let identity = manager
            .create_account(&SignupRequest {
                username: "skipper".to_string(),
                password: "correct-horse".to_string(),
                first_name: "Test".to_string(),
                last_name: "Pilot".to_string(),
                email: "skipper@example.com".to_string(),
            })
            .await
            .unwrap();
        sqlx::query("UPDATE profile SET email_verified = 1 WHERE identity_id = ?1")
            .bind(identity.id)
            .execute(pool)
            .await
            .unwrap();
        identity.id
    }

    fn login(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_generic_failure() {
        let (guard, _, _) = guard_fixture().await;
        let err = guard
            .authenticate(&login("nobody@example.com", "some-password"), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_short_inputs_are_validation_errors() {
        let (guard, _, _) = guard_fixture().await;
        let err = guard
            .authenticate(&login("ab", "short"), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_lockout_after_threshold_and_sticky() {
        let (guard, manager, pool) = guard_fixture().await;
        let id = create_verified(&manager, &pool).await;
        let ctx = RequestContext::default();

        for attempt in 1..LOCKOUT_THRESHOLD {
            let err = guard
                .authenticate(&login("skipper", "wrong-password"), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidCredentials), "attempt {}", attempt);
        }

        // Fifth failure flips the lock
        let err = guard
            .authenticate(&login("skipper", "wrong-password"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccountLocked));

        let profile = manager.get_profile(id).await.unwrap();
        assert!(profile.is_locked);
        assert_eq!(profile.login_attempts, LOCKOUT_THRESHOLD);
        assert_eq!(profile.last_failed_location.as_deref(), Some("Unknown location"));

        // The lock is sticky: the correct password no longer helps, and the
        // counter stays where it was (no verification happens).
        let err = guard
            .authenticate(&login("skipper", "correct-horse"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccountLocked));
        let profile = manager.get_profile(id).await.unwrap();
        assert_eq!(profile.login_attempts, LOCKOUT_THRESHOLD);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (guard, manager, pool) = guard_fixture().await;
        let id = create_verified(&manager, &pool).await;
        let ctx = RequestContext::default();

        for _ in 0..4 {
            let _ = guard
                .authenticate(&login("skipper", "wrong-password"), &ctx)
                .await
                .unwrap_err();
        }
        assert_eq!(manager.get_profile(id).await.unwrap().login_attempts, 4);

        let success = guard
            .authenticate(&login("skipper", "correct-horse"), &ctx)
            .await
            .unwrap();
        assert_eq!(success.identity_id, id);
        assert_eq!(manager.get_profile(id).await.unwrap().login_attempts, 0);
    }

    #[tokio::test]
    async fn test_unverified_email_blocks_session() {
        let (guard, manager, pool) = guard_fixture().await;
        let identity = manager
            .create_account(&SignupRequest {
                username: "newbie".to_string(),
                password: "correct-horse".to_string(),
                first_name: "Fresh".to_string(),
                last_name: "Pilot".to_string(),
                email: "newbie@example.com".to_string(),
            })
            .await
            .unwrap();

        let err = guard
            .authenticate(&login("newbie", "correct-horse"), &RequestContext::default())
            .await
            .unwrap_err();
        match err {
            CoreError::EmailNotVerified { identity_id } => assert_eq!(identity_id, identity.id),
            other => panic!("expected EmailNotVerified, got {:?}", other),
        }

        // No session was established
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session WHERE identity_id = ?1")
            .bind(identity.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_login_by_email_identifier() {
        let (guard, manager, pool) = guard_fixture().await;
        let id = create_verified(&manager, &pool).await;

        let success = guard
            .authenticate(
                &login("skipper@example.com", "correct-horse"),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(success.identity_id, id);
    }
}
