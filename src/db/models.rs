/// Core database models
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity record: the credential-bearing account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Profile record, 1:1 with an identity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub identity_id: i64,
    pub first_name: String,
    pub last_name: String,
    /// May diverge from the identity email until verification completes
    pub email: String,
    pub registration_date: NaiveDate,
    pub reputation_tier_id: i64,
    pub score: i64,
    pub cash_balance_cents: i64,
    pub first_access: bool,
    pub email_verified: bool,
    pub login_attempts: i64,
    pub is_locked: bool,
    pub last_failed_ip: Option<String>,
    pub last_failed_location: Option<String>,
    pub last_failed_latitude: Option<f64>,
    pub last_failed_longitude: Option<f64>,
}

/// Reset or verification token. Deleted on consume or on expiry
/// detected at read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub identity_id: i64,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Session record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub identity_id: i64,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Reputation tier: a named bracket defined by its score floor
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReputationTier {
    pub id: i64,
    pub min_score: i64,
    pub grade: String,
}

/// Reputation event type definition with its fixed point value
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReputationType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub points: i64,
}

/// One append-only ledger entry, joined with its type for display
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub id: i64,
    pub profile_id: i64,
    pub type_name: String,
    pub points: i64,
    pub score_date: NaiveDate,
    pub reason: String,
}
