//! In-memory [`IdentityStore`] used by tests and local development.
//!
//! Enforces the same uniqueness constraints as the SQL schema and applies each
//! multi-row write under one lock, so it is atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{constraints, IdentityStore, StoreError};
use crate::models::{Account, AuditLogEntry, OAuthState, Provider, Session, User, UserStatus};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: Vec<Account>,
    sessions: HashMap<String, Session>,
    oauth_states: HashMap<String, OAuthState>,
    audit_logs: Vec<AuditLogEntry>,
}

impl Tables {
    fn check_user(&self, user: &User) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }
        Ok(())
    }

    fn check_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.accounts.iter().any(|a| {
            a.provider_code == account.provider_code
                && a.provider_subject_id == account.provider_subject_id
        }) {
            return Err(StoreError::unique(constraints::ACCOUNTS_PROVIDER_SUBJECT));
        }
        if self
            .accounts
            .iter()
            .any(|a| a.user_id == account.user_id && a.provider_code == account.provider_code)
        {
            return Err(StoreError::unique(constraints::ACCOUNTS_USER_PROVIDER));
        }
        Ok(())
    }

    fn user_mut(&mut self, user_id: Uuid) -> Result<&mut User, StoreError> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Internal(format!("User {} does not exist", user_id)))
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    tables: Mutex<Tables>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.values().cloned().collect()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.lock().accounts.clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn oauth_states(&self) -> Vec<OAuthState> {
        self.lock().oauth_states.values().cloned().collect()
    }

    /// Audit entries in insertion order.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.lock().audit_logs.clone()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn account_count(&self) -> usize {
        self.lock().accounts.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_user(user)?;
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn insert_user_with_account(
        &self,
        user: &User,
        account: &Account,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_user(user)?;
        tables.check_account(account)?;
        tables.users.insert(user.user_id, user.clone());
        tables.accounts.push(account.clone());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.user_mut(user_id)?.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
        profile_picture: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let user = tables.user_mut(user_id)?;
        user.display_name = display_name.map(str::to_string);
        user.profile_picture = profile_picture.map(str::to_string);
        Ok(())
    }

    async fn update_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.user_mut(user_id)?.status_code = status.as_str().to_string();
        Ok(())
    }

    async fn find_account_by_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .find(|a| a.provider_code == provider.as_str() && a.provider_subject_id == subject)
            .cloned())
    }

    async fn find_account_for_user(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .find(|a| a.user_id == user_id && a.provider_code == provider.as_str())
            .cloned())
    }

    async fn insert_account(
        &self,
        account: &Account,
        backfill_picture: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_account(account)?;
        let user = tables.user_mut(account.user_id)?;
        if let Some(picture) = backfill_picture {
            if user.profile_picture.is_none() {
                user.profile_picture = Some(picture.to_string());
            }
        }
        tables.accounts.push(account.clone());
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.sessions.contains_key(&session.token_hash) {
            return Err(StoreError::unique("sessions_pkey"));
        }
        tables
            .sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.get(token_hash).cloned())
    }

    async fn take_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.remove(token_hash))
    }

    async fn delete_sessions_expired_before(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_utc > now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.oauth_states.contains_key(&state.state_hash) {
            return Err(StoreError::unique("oauth_states_pkey"));
        }
        tables
            .oauth_states
            .insert(state.state_hash.clone(), state.clone());
        Ok(())
    }

    async fn take_oauth_state(&self, state_hash: &str) -> Result<Option<OAuthState>, StoreError> {
        Ok(self.lock().oauth_states.remove(state_hash))
    }

    async fn delete_oauth_states_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let before = tables.oauth_states.len();
        tables.oauth_states.retain(|_, s| s.expires_utc > now);
        Ok((before - tables.oauth_states.len()) as u64)
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.lock().audit_logs.push(entry.clone());
        Ok(())
    }
}
