/// Time-boxed, single-use token store for password reset and email
/// verification
///
/// Both kinds share one table and one lifecycle: a fixed 30-minute
/// validity window, deletion on successful consume, and deletion the
/// moment expiry is detected at read.

use crate::{
    error::{CoreError, CoreResult},
    metrics,
};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Validity window for every token kind
pub const TOKEN_TTL_MINUTES: i64 = 30;

/// Reset tokens are short hex strings of this length
const RESET_TOKEN_LEN: usize = 12;

/// How often issuance retries on an opaque-value collision
const MAX_ISSUE_ATTEMPTS: u32 = 5;

/// Token kind, selecting the opaque value shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Reset,
    Verify,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Reset => "reset",
            TokenKind::Verify => "verify",
        }
    }

    /// Generate a fresh opaque value: short hex for reset links, a
    /// 128-bit identifier for verification links.
    fn generate(&self) -> String {
        match self {
            TokenKind::Reset => {
                let mut bytes = [0u8; RESET_TOKEN_LEN / 2];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
            TokenKind::Verify => Uuid::new_v4().to_string(),
        }
    }
}

/// Token store service
pub struct TokenStore {
    db: SqlitePool,
}

impl TokenStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a token for an identity
    ///
    /// The opaque value is globally unique; a collision with an existing
    /// active token regenerates rather than failing.
    pub async fn issue(&self, identity_id: i64, kind: TokenKind) -> CoreResult<String> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(TOKEN_TTL_MINUTES);

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let value = kind.generate();

            let result = sqlx::query(
                "INSERT INTO auth_token (token, identity_id, kind, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&value)
            .bind(identity_id)
            .bind(kind.as_str())
            .bind(now)
            .bind(expires_at)
            .execute(&self.db)
            .await;

            match result {
                Ok(_) => {
                    tracing::debug!("Issued {} token for identity {}", kind.as_str(), identity_id);
                    metrics::TOKENS_ISSUED_TOTAL
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    return Ok(value);
                }
                Err(e) => {
                    let collision = e
                        .as_database_error()
                        .map(|d| d.is_unique_violation())
                        .unwrap_or(false);
                    if !collision {
                        return Err(CoreError::Database(e));
                    }
                    tracing::debug!("Token collision for {} token, regenerating", kind.as_str());
                }
            }
        }

        Err(CoreError::Internal(
            "Could not generate a unique token".to_string(),
        ))
    }

    /// Consume a token: delete it and return the owning identity id
    ///
    /// An expired record is deleted on detection and reported as such;
    /// the expiry check precedes any state-mutating use.
    pub async fn consume(&self, value: &str, kind: TokenKind) -> CoreResult<i64> {
        let identity_id = self.lookup(value, kind).await?;

        sqlx::query("DELETE FROM auth_token WHERE token = ?1 AND kind = ?2")
            .bind(value)
            .bind(kind.as_str())
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        metrics::TOKENS_CONSUMED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        Ok(identity_id)
    }

    /// Read-only validity check, for presenting a form before submission
    ///
    /// Same lookup and expiry semantics as consume, including deletion of
    /// an expired record, but a valid token survives the call.
    pub async fn peek(&self, value: &str, kind: TokenKind) -> CoreResult<i64> {
        self.lookup(value, kind).await
    }

    async fn lookup(&self, value: &str, kind: TokenKind) -> CoreResult<i64> {
        let row = sqlx::query(
            "SELECT identity_id, expires_at FROM auth_token WHERE token = ?1 AND kind = ?2",
        )
        .bind(value)
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or(CoreError::TokenNotFound)?;

        let identity_id: i64 = row.try_get("identity_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        if Utc::now() > expires_at {
            sqlx::query("DELETE FROM auth_token WHERE token = ?1 AND kind = ?2")
                .bind(value)
                .bind(kind.as_str())
                .execute(&self.db)
                .await
                .map_err(CoreError::Database)?;

            tracing::debug!("Deleted expired {} token", kind.as_str());
            return Err(CoreError::TokenExpired);
        }

        Ok(identity_id)
    }
}
