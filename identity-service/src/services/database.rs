//! PostgreSQL implementation of [`IdentityStore`].
//!
//! Uses sqlx runtime queries against the schema in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::store::{IdentityStore, StoreError};
use crate::models::{Account, AuditLogEntry, OAuthState, Provider, Session, User, UserStatus};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const INSERT_USER: &str = r#"
    INSERT INTO users (user_id, email, email_verified, display_name, password_hash, profile_picture, status_code, created_utc)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const INSERT_ACCOUNT: &str = r#"
    INSERT INTO accounts (account_id, user_id, provider_code, provider_subject_id, access_token, refresh_token, expires_utc, profile_snapshot, created_utc)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

fn bind_user<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    user: &'q User,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(user.user_id)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(&user.profile_picture)
        .bind(&user.status_code)
        .bind(user.created_utc)
}

fn bind_account<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    account: &'q Account,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(account.account_id)
        .bind(account.user_id)
        .bind(&account.provider_code)
        .bind(&account.provider_subject_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_utc)
        .bind(&account.profile_snapshot)
        .bind(account.created_utc)
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    /// Health check - ping the database.
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::from(e)
        })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        bind_user(sqlx::query(INSERT_USER), user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_user_with_account(
        &self,
        user: &User,
        account: &Account,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        bind_user(sqlx::query(INSERT_USER), user)
            .execute(&mut *tx)
            .await?;
        bind_account(sqlx::query(INSERT_ACCOUNT), account)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
        profile_picture: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET display_name = $1, profile_picture = $2 WHERE user_id = $3")
            .bind(display_name)
            .bind(profile_picture)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET status_code = $1 WHERE user_id = $2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Account Operations ====================

    async fn find_account_by_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE provider_code = $1 AND provider_subject_id = $2",
        )
        .bind(provider.as_str())
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_account_for_user(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> Result<Option<Account>, StoreError> {
        Ok(sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = $1 AND provider_code = $2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_account(
        &self,
        account: &Account,
        backfill_picture: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        bind_account(sqlx::query(INSERT_ACCOUNT), account)
            .execute(&mut *tx)
            .await?;

        if let Some(picture) = backfill_picture {
            sqlx::query(
                "UPDATE users SET profile_picture = $1 WHERE user_id = $2 AND profile_picture IS NULL",
            )
            .bind(picture)
            .bind(account.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ==================== Session Operations ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, expires_utc, ip_address, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(session.expires_utc)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn take_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        Ok(sqlx::query_as::<_, Session>(
            "DELETE FROM sessions WHERE token_hash = $1 RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_sessions_expired_before(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ==================== OAuth State Operations ====================

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state_hash, provider_code, purpose_code, user_id, redirect_target, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&state.state_hash)
        .bind(&state.provider_code)
        .bind(&state.purpose_code)
        .bind(state.user_id)
        .bind(&state.redirect_target)
        .bind(state.expires_utc)
        .bind(state.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_oauth_state(&self, state_hash: &str) -> Result<Option<OAuthState>, StoreError> {
        // Single statement: concurrent redeemers race on the row lock, one wins.
        Ok(sqlx::query_as::<_, OAuthState>(
            "DELETE FROM oauth_states WHERE state_hash = $1 RETURNING *",
        )
        .bind(state_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_oauth_states_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ==================== Audit Operations ====================

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (entry_id, action_code, actor_user_id, target_type, target_id, before_data, after_data, ip_address, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id)
        .bind(&entry.action_code)
        .bind(entry.actor_user_id)
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(&entry.before_data)
        .bind(&entry.after_data)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
