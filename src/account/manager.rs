/// Account manager implementation using runtime queries
///
/// Uses sqlx runtime query building instead of compile-time macros to
/// avoid needing DATABASE_URL during compilation.

use crate::{
    account::{SettingsUpdateRequest, SignupRequest, ValidatedSession},
    config::ServerConfig,
    db::models::{Identity, Profile, Session},
    error::{CoreError, CoreResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Opening balance credited to every new profile, in cents (5000.00)
const SIGNUP_BALANCE_CENTS: i64 = 500_000;

/// Hash a password with Argon2id
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Internal(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2id hash
pub fn verify_password(password: &str, hash: &str) -> CoreResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| CoreError::Internal(format!("Stored hash is malformed: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Create a new identity with its profile
    ///
    /// New profiles start at the floor reputation tier with score 0, an
    /// opening cash balance, and an unverified email.
    pub async fn create_account(&self, req: &SignupRequest) -> CoreResult<Identity> {
        if self.username_exists(&req.username, None).await? {
            return Err(CoreError::Conflict("Username already in use".to_string()));
        }
        if self.email_exists(&req.email, None).await? {
            return Err(CoreError::Conflict("Email already in use".to_string()));
        }

        let password_hash = hash_password(&req.password)?;
        let now = Utc::now();

        let mut tx = self.db.begin().await.map_err(CoreError::Database)?;

        let floor_tier_id: i64 =
            sqlx::query_scalar("SELECT id FROM reputation_tier ORDER BY min_score ASC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(CoreError::Database)?
                .ok_or_else(|| {
                    CoreError::Internal("Initial reputation tier not found".to_string())
                })?;

        let identity_id: i64 = sqlx::query_scalar(
            "INSERT INTO identity (username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id",
        )
        .bind(&req.username)
        .bind(&req.email)
        .bind(&password_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(CoreError::Database)?;

        sqlx::query(
            "INSERT INTO profile (identity_id, first_name, last_name, email,
                                  registration_date, reputation_tier_id, score,
                                  cash_balance_cents, first_access, email_verified,
                                  login_attempts, is_locked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 1, 0, 0, 0)",
        )
        .bind(identity_id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.email)
        .bind(now.date_naive())
        .bind(floor_tier_id)
        .bind(SIGNUP_BALANCE_CENTS)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::Database)?;

        tx.commit().await.map_err(CoreError::Database)?;

        tracing::info!("Created account {} ({})", req.username, identity_id);

        Ok(Identity {
            id: identity_id,
            username: req.username.clone(),
            email: req.email.clone(),
            password_hash,
            created_at: now,
        })
    }

    /// Check if a username is taken, optionally excluding one identity
    pub async fn username_exists(
        &self,
        username: &str,
        exclude_id: Option<i64>,
    ) -> CoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM identity WHERE username = ?1 AND id != ?2",
        )
        .bind(username)
        .bind(exclude_id.unwrap_or(-1))
        .fetch_one(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(count > 0)
    }

    /// Check if an email is taken, optionally excluding one identity
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> CoreResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM identity WHERE email = ?1 AND id != ?2")
                .bind(email)
                .bind(exclude_id.unwrap_or(-1))
                .fetch_one(&self.db)
                .await
                .map_err(CoreError::Database)?;

        Ok(count > 0)
    }

    /// Get identity by id
    pub async fn get_identity(&self, id: i64) -> CoreResult<Identity> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at FROM identity WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Identity not found".to_string()))?;

        Ok(Self::identity_from_row(&row)?)
    }

    /// Find identity by username, falling back to email
    ///
    /// Used by password reset, where either is accepted.
    pub async fn get_identity_by_identifier(&self, identifier: &str) -> CoreResult<Identity> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at
             FROM identity WHERE username = ?1 OR email = ?1
             ORDER BY CASE WHEN username = ?1 THEN 0 ELSE 1 END
             LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Identity not found".to_string()))?;

        Ok(Self::identity_from_row(&row)?)
    }

    /// Resolve identity + profile from a login identifier
    ///
    /// An identifier containing "@" resolves by profile email first, else
    /// by username. Returns None when nothing matches.
    pub async fn resolve_login_identifier(
        &self,
        identifier: &str,
    ) -> CoreResult<Option<(Identity, Profile)>> {
        let row = if identifier.contains('@') {
            sqlx::query(
                "SELECT i.id, i.username, i.email, i.password_hash, i.created_at
                 FROM identity i JOIN profile p ON p.identity_id = i.id
                 WHERE p.email = ?1",
            )
            .bind(identifier)
            .fetch_optional(&self.db)
            .await
            .map_err(CoreError::Database)?
        } else {
            sqlx::query(
                "SELECT id, username, email, password_hash, created_at
                 FROM identity WHERE username = ?1",
            )
            .bind(identifier)
            .fetch_optional(&self.db)
            .await
            .map_err(CoreError::Database)?
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let identity = Self::identity_from_row(&row)?;
        let profile = self.get_profile(identity.id).await?;

        Ok(Some((identity, profile)))
    }

    /// Get profile by identity id
    pub async fn get_profile(&self, identity_id: i64) -> CoreResult<Profile> {
        let row = sqlx::query(
            "SELECT identity_id, first_name, last_name, email, registration_date,
                    reputation_tier_id, score, cash_balance_cents, first_access,
                    email_verified, login_attempts, is_locked, last_failed_ip,
                    last_failed_location, last_failed_latitude, last_failed_longitude
             FROM profile WHERE identity_id = ?1",
        )
        .bind(identity_id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Profile not found".to_string()))?;

        Ok(Profile {
            identity_id: row.get("identity_id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            registration_date: row.get("registration_date"),
            reputation_tier_id: row.get("reputation_tier_id"),
            score: row.get("score"),
            cash_balance_cents: row.get("cash_balance_cents"),
            first_access: row.get("first_access"),
            email_verified: row.get("email_verified"),
            login_attempts: row.get("login_attempts"),
            is_locked: row.get("is_locked"),
            last_failed_ip: row.get("last_failed_ip"),
            last_failed_location: row.get("last_failed_location"),
            last_failed_latitude: row.get("last_failed_latitude"),
            last_failed_longitude: row.get("last_failed_longitude"),
        })
    }

    /// Replace an identity's password hash
    pub async fn update_password(&self, identity_id: i64, new_password: &str) -> CoreResult<()> {
        let password_hash = hash_password(new_password)?;

        sqlx::query("UPDATE identity SET password_hash = ?1 WHERE id = ?2")
            .bind(&password_hash)
            .bind(identity_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        Ok(())
    }

    /// Mark a profile's email as verified
    pub async fn mark_email_verified(&self, identity_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE profile SET email_verified = 1 WHERE identity_id = ?1")
            .bind(identity_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        tracing::info!("Email verified for identity {}", identity_id);

        Ok(())
    }

    /// Apply a settings update, returning human-readable change descriptions
    ///
    /// Username changes are uniqueness-checked; a password change requires
    /// the current password plus a matching confirmation.
    pub async fn update_settings(
        &self,
        identity_id: i64,
        req: &SettingsUpdateRequest,
    ) -> CoreResult<Vec<String>> {
        let identity = self.get_identity(identity_id).await?;
        let profile = self.get_profile(identity_id).await?;
        let mut changes = Vec::new();

        if let Some(new_username) = req.username.as_deref().map(str::trim) {
            if !new_username.is_empty() && new_username != identity.username {
                if !(3..=30).contains(&new_username.len()) {
                    return Err(CoreError::Validation(
                        "Username must be between 3 and 30 characters".to_string(),
                    ));
                }
                if self.username_exists(new_username, Some(identity_id)).await? {
                    return Err(CoreError::Conflict(
                        "This username is already taken".to_string(),
                    ));
                }
                sqlx::query("UPDATE identity SET username = ?1 WHERE id = ?2")
                    .bind(new_username)
                    .bind(identity_id)
                    .execute(&self.db)
                    .await
                    .map_err(CoreError::Database)?;
                changes.push(format!(
                    "Username changed from '{}' to '{}'",
                    identity.username, new_username
                ));
            }
        }

        if let Some(new_first) = req.first_name.as_deref().map(str::trim) {
            if !new_first.is_empty() && new_first != profile.first_name {
                sqlx::query("UPDATE profile SET first_name = ?1 WHERE identity_id = ?2")
                    .bind(new_first)
                    .bind(identity_id)
                    .execute(&self.db)
                    .await
                    .map_err(CoreError::Database)?;
                changes.push(format!(
                    "First name changed from '{}' to '{}'",
                    profile.first_name, new_first
                ));
            }
        }

        if let Some(new_last) = req.last_name.as_deref().map(str::trim) {
            if !new_last.is_empty() && new_last != profile.last_name {
                sqlx::query("UPDATE profile SET last_name = ?1 WHERE identity_id = ?2")
                    .bind(new_last)
                    .bind(identity_id)
                    .execute(&self.db)
                    .await
                    .map_err(CoreError::Database)?;
                changes.push(format!(
                    "Last name changed from '{}' to '{}'",
                    profile.last_name, new_last
                ));
            }
        }

        let wants_password_change = req.current_password.is_some()
            || req.new_password.is_some()
            || req.confirm_password.is_some();

        if wants_password_change {
            let (Some(current), Some(new), Some(confirm)) = (
                req.current_password.as_deref(),
                req.new_password.as_deref(),
                req.confirm_password.as_deref(),
            ) else {
                return Err(CoreError::Validation(
                    "Please fill in all password fields to change your password".to_string(),
                ));
            };

            if !verify_password(current, &identity.password_hash)? {
                return Err(CoreError::Validation(
                    "Current password is incorrect".to_string(),
                ));
            }
            if new != confirm {
                return Err(CoreError::Validation(
                    "New password and confirmation do not match".to_string(),
                ));
            }
            if !(8..=128).contains(&new.len()) {
                return Err(CoreError::Validation(
                    "Password must be between 8 and 128 characters".to_string(),
                ));
            }

            self.update_password(identity_id, new).await?;
            changes.push("Password changed successfully".to_string());
        }

        Ok(changes)
    }

    // ===== Session boundary =====

    /// Establish a session for an identity
    pub async fn establish_session(&self, identity_id: i64) -> CoreResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let access_token = self.generate_access_token(identity_id, &session_id)?;

        let now = Utc::now();
        let expires_at = now + Duration::hours(self.config.security.session_hours);

        sqlx::query(
            "INSERT INTO session (id, identity_id, access_token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session_id)
        .bind(identity_id)
        .bind(&access_token)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(Session {
            id: session_id,
            identity_id,
            access_token,
            created_at: now,
            expires_at,
        })
    }

    /// Validate access token and return session info
    pub async fn validate_access_token(&self, token: &str) -> CoreResult<ValidatedSession> {
        let row = sqlx::query(
            "SELECT id, identity_id, expires_at FROM session WHERE access_token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::Authentication("Invalid or expired session".to_string()))?;

        let session_id: String = row.get("id");
        let identity_id: i64 = row.get("identity_id");
        let expires_at: DateTime<Utc> = row.get("expires_at");

        if Utc::now() > expires_at {
            return Err(CoreError::Authentication("Session expired".to_string()));
        }

        Ok(ValidatedSession {
            identity_id,
            session_id,
        })
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        Ok(())
    }

    /// Delete every session for an identity (after a password reset)
    pub async fn delete_sessions_for(&self, identity_id: i64) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE identity_id = ?1")
            .bind(identity_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        Ok(result.rows_affected())
    }

    fn identity_from_row(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Identity> {
        Ok(Identity {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn generate_access_token(&self, identity_id: i64, session_id: &str) -> CoreResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize)]
        struct Claims {
            sub: String,
            sid: String,
            iat: i64,
            exp: i64,
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: identity_id.to_string(),
            sid: session_id.to_string(),
            iat: now,
            exp: now + self.config.security.session_hours * 3600,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.security.jwt_secret.as_bytes()),
        )
        .map_err(|e| CoreError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SignupRequest;
    use crate::config::test_support::test_config;
    use crate::db;

    fn signup(username: &str, email: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            password: "correct-horse".to_string(),
            first_name: "Test".to_string(),
            last_name: "Pilot".to_string(),
            email: email.to_string(),
        }
    }

    async fn manager() -> AccountManager {
        let pool = db::test_pool().await;
        AccountManager::new(pool, Arc::new(test_config()))
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_create_account_sets_profile_defaults() {
        let mgr = manager().await;
        let identity = mgr.create_account(&signup("aviator", "a@example.com")).await.unwrap();

        let profile = mgr.get_profile(identity.id).await.unwrap();
        assert_eq!(profile.score, 0);
        assert_eq!(profile.cash_balance_cents, 500_000);
        assert!(!profile.email_verified);
        assert!(!profile.is_locked);
        assert_eq!(profile.login_attempts, 0);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let mgr = manager().await;
        mgr.create_account(&signup("bob", "bob@example.com")).await.unwrap();

        let err = mgr
            .create_account(&signup("bob", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_resolve_identifier_by_email_and_username() {
        let mgr = manager().await;
        let identity = mgr.create_account(&signup("carol", "carol@example.com")).await.unwrap();

        let by_email = mgr
            .resolve_login_identifier("carol@example.com")
            .await
            .unwrap()
            .expect("resolved by email");
        assert_eq!(by_email.0.id, identity.id);

        let by_name = mgr
            .resolve_login_identifier("carol")
            .await
            .unwrap()
            .expect("resolved by username");
        assert_eq!(by_name.0.id, identity.id);

        assert!(mgr.resolve_login_identifier("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_establish_validate_delete() {
        let mgr = manager().await;
        let identity = mgr.create_account(&signup("dave", "dave@example.com")).await.unwrap();

        let session = mgr.establish_session(identity.id).await.unwrap();
        let validated = mgr.validate_access_token(&session.access_token).await.unwrap();
        assert_eq!(validated.identity_id, identity.id);

        mgr.delete_session(&session.id).await.unwrap();
        assert!(mgr.validate_access_token(&session.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_password_change_requires_current() {
        let mgr = manager().await;
        let identity = mgr.create_account(&signup("erin", "erin@example.com")).await.unwrap();

        let req = SettingsUpdateRequest {
            current_password: Some("wrong-password".to_string()),
            new_password: Some("new-password-1".to_string()),
            confirm_password: Some("new-password-1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            mgr.update_settings(identity.id, &req).await.unwrap_err(),
            CoreError::Validation(_)
        ));

        let req = SettingsUpdateRequest {
            current_password: Some("correct-horse".to_string()),
            new_password: Some("new-password-1".to_string()),
            confirm_password: Some("new-password-1".to_string()),
            ..Default::default()
        };
        let changes = mgr.update_settings(identity.id, &req).await.unwrap();
        assert_eq!(changes, vec!["Password changed successfully".to_string()]);

        let refreshed = mgr.get_identity(identity.id).await.unwrap();
        assert!(verify_password("new-password-1", &refreshed.password_hash).unwrap());
    }
}
