//! Session Store: opaque, revocable, server-side sessions.
//!
//! The client holds the raw token; the store only ever sees its SHA-256.

use std::sync::Arc;

use chrono::Duration;

use super::audit::AuditLogger;
use super::clock::Clock;
use super::error::ServiceError;
use super::store::IdentityStore;
use crate::models::{AuditAction, AuthIdentity, ClientMeta, Session};
use crate::utils::{generate_token, hash_token};

pub const SESSION_TTL_DAYS: i64 = 7;

/// A freshly opened session. `token` is the only copy of the raw capability.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl SessionStore {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, audit: AuditLogger) -> Self {
        Self { store, clock, audit }
    }

    pub fn ttl() -> Duration {
        Duration::days(SESSION_TTL_DAYS)
    }

    /// Open a session for an authenticated user and record a `login`.
    pub async fn create(
        &self,
        user_id: uuid::Uuid,
        client: &ClientMeta,
    ) -> Result<IssuedSession, ServiceError> {
        self.open(user_id, client, AuditAction::Login).await
    }

    /// Open a session and record it under `action` (`login` or `signup`).
    pub(crate) async fn open(
        &self,
        user_id: uuid::Uuid,
        client: &ClientMeta,
        action: AuditAction,
    ) -> Result<IssuedSession, ServiceError> {
        let token = generate_token();
        let session = Session::new(
            hash_token(&token),
            user_id,
            Self::ttl(),
            client,
            self.clock.now(),
        );
        self.store.insert_session(&session).await?;

        self.audit
            .record(
                self.audit
                    .entry(action, Some(user_id))
                    .target("user", user_id)
                    .client(client),
            )
            .await;

        tracing::info!(user_id = %user_id, action = action.as_str(), "Session opened");
        Ok(IssuedSession { token, session })
    }

    /// Resolve a session token to the identity behind it.
    ///
    /// Expired sessions are deleted on read. Sessions of inactive users are kept,
    /// since the status may change back.
    pub async fn verify(&self, token: &str) -> Result<Option<AuthIdentity>, ServiceError> {
        let token_hash = hash_token(token);
        let Some(session) = self.store.find_session(&token_hash).await? else {
            return Ok(None);
        };

        if session.is_expired_at(self.clock.now()) {
            self.store.take_session(&token_hash).await?;
            tracing::debug!(user_id = %session.user_id, "Expired session removed");
            return Ok(None);
        }

        let Some(user) = self.store.find_user_by_id(session.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active() {
            tracing::warn!(user_id = %user.user_id, "Session belongs to inactive user");
            return Ok(None);
        }

        Ok(Some(AuthIdentity::from(&user)))
    }

    /// Revoke a session. Revoking an unknown token is a no-op.
    pub async fn destroy(&self, token: &str, client: &ClientMeta) -> Result<(), ServiceError> {
        if let Some(session) = self.store.take_session(&hash_token(token)).await? {
            self.audit
                .record(
                    self.audit
                        .entry(AuditAction::Logout, Some(session.user_id))
                        .target("user", session.user_id)
                        .client(client),
                )
                .await;
            tracing::info!(user_id = %session.user_id, "Session destroyed");
        }
        Ok(())
    }

    /// Bulk-delete expired sessions; returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        let removed = self
            .store
            .delete_sessions_expired_before(self.clock.now())
            .await?;
        tracing::info!(removed, "Expired sessions swept");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserStatus};
    use crate::services::clock::ManualClock;
    use crate::services::memory::InMemoryIdentityStore;
    use chrono::Utc;

    struct Fixture {
        store: Arc<InMemoryIdentityStore>,
        clock: Arc<ManualClock>,
        sessions: SessionStore,
        user: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let audit = AuditLogger::new(store.clone(), clock.clone());
        let sessions = SessionStore::new(store.clone(), clock.clone(), audit);

        let user = User::new_local("a@x.com", "hash".into(), Some("A".into()), clock.now());
        store.insert_user(&user).await.unwrap();

        Fixture {
            store,
            clock,
            sessions,
            user,
        }
    }

    #[tokio::test]
    async fn test_create_then_verify_then_destroy() {
        let f = fixture().await;
        let issued = f
            .sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();

        let identity = f.sessions.verify(&issued.token).await.unwrap().unwrap();
        assert_eq!(identity.user_id, f.user.user_id);
        assert_eq!(identity.email, "a@x.com");

        f.sessions
            .destroy(&issued.token, &ClientMeta::default())
            .await
            .unwrap();
        assert!(f.sessions.verify(&issued.token).await.unwrap().is_none());

        let actions: Vec<String> = f
            .store
            .audit_entries()
            .iter()
            .map(|e| e.action_code.clone())
            .collect();
        assert_eq!(actions, vec!["login", "logout"]);
    }

    #[tokio::test]
    async fn test_token_is_not_stored_in_clear() {
        let f = fixture().await;
        let issued = f
            .sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();

        let stored = f.store.sessions();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].token_hash, issued.token);
        assert_eq!(stored[0].expires_utc, f.clock.now() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed_on_read() {
        let f = fixture().await;
        let issued = f
            .sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();

        f.clock.advance(Duration::days(7) + Duration::seconds(1));
        assert!(f.sessions.verify(&issued.token).await.unwrap().is_none());
        assert_eq!(f.store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_user_keeps_session_row() {
        let f = fixture().await;
        let issued = f
            .sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();

        f.store
            .update_user_status(f.user.user_id, UserStatus::Suspended)
            .await
            .unwrap();
        assert!(f.sessions.verify(&issued.token).await.unwrap().is_none());
        assert_eq!(f.store.session_count(), 1);

        f.store
            .update_user_status(f.user.user_id, UserStatus::Active)
            .await
            .unwrap();
        assert!(f.sessions.verify(&issued.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let f = fixture().await;
        f.sessions
            .destroy("never-issued", &ClientMeta::default())
            .await
            .unwrap();
        assert!(f.store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let f = fixture().await;
        f.sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();
        f.clock.advance(Duration::days(3));
        f.sessions
            .create(f.user.user_id, &ClientMeta::default())
            .await
            .unwrap();

        f.clock.advance(Duration::days(5));
        assert_eq!(f.sessions.sweep_expired().await.unwrap(), 1);
        assert_eq!(f.store.session_count(), 1);
    }
}
