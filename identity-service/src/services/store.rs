//! Persistence seam for the identity core.
//!
//! Uniqueness is enforced by the store, not by callers: a conflicting insert fails with
//! [`StoreError::UniqueViolation`] naming the violated constraint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, AuditLogEntry, OAuthState, Provider, Session, User, UserStatus};

/// Names of the unique constraints declared in the migrations.
pub mod constraints {
    pub const USERS_EMAIL: &str = "users_email_key";
    pub const ACCOUNTS_PROVIDER_SUBJECT: &str = "accounts_provider_subject_key";
    pub const ACCOUNTS_USER_PROVIDER: &str = "accounts_user_provider_key";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    /// The violated constraint, if this is a uniqueness failure.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    // ==================== Users ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Insert a user and its first external account in one atomic unit.
    async fn insert_user_with_account(
        &self,
        user: &User,
        account: &Account,
    ) -> Result<(), StoreError>;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
        profile_picture: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn update_user_status(&self, user_id: Uuid, status: UserStatus)
        -> Result<(), StoreError>;

    // ==================== Accounts ====================

    async fn find_account_by_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn find_account_for_user(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> Result<Option<Account>, StoreError>;

    /// Insert an account for an existing user. When `backfill_picture` is set, it is
    /// written to the user only if the user has no picture yet. Both writes commit or
    /// neither does.
    async fn insert_account(
        &self,
        account: &Account,
        backfill_picture: Option<&str>,
    ) -> Result<(), StoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError>;

    /// Delete and return the session, if present.
    async fn take_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError>;

    async fn delete_sessions_expired_before(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // ==================== OAuth states ====================

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), StoreError>;

    /// Atomically delete and return the state row. At most one caller ever gets `Some`.
    async fn take_oauth_state(&self, state_hash: &str) -> Result<Option<OAuthState>, StoreError>;

    async fn delete_oauth_states_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // ==================== Audit ====================

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;
}
