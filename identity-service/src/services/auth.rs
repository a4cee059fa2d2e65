//! Local password accounts and profile maintenance.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::audit::AuditLogger;
use super::clock::Clock;
use super::error::ServiceError;
use super::session::{IssuedSession, SessionStore};
use super::store::IdentityStore;
use crate::models::{normalize_email, AuditAction, ClientMeta, User};
use crate::utils::{generate_token, hash_password, verify_password, Password, PasswordHashString};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    sessions: SessionStore,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
    /// Hash of a random secret, verified against when no stored hash exists so every
    /// login attempt pays for one argon2 verification.
    timing_hash: Option<PasswordHashString>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sessions: SessionStore,
        audit: AuditLogger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timing_hash = hash_password(&Password::new(generate_token()))
            .map_err(|e| tracing::error!(error = %e, "Failed to prepare login timing hash"))
            .ok();

        Self {
            store,
            sessions,
            audit,
            clock,
            timing_hash,
        }
    }

    pub(crate) fn timing_hash(&self) -> Option<&PasswordHashString> {
        self.timing_hash.as_ref()
    }

    /// Spend one argon2 verification so a missing account costs the same as a wrong password.
    fn reject_without_hash(&self, password: &Password) -> ServiceError {
        if let Some(timing_hash) = &self.timing_hash {
            let _ = verify_password(password, timing_hash);
        }
        ServiceError::InvalidCredentials
    }

    pub async fn register(
        &self,
        email: &str,
        password: Password,
        display_name: Option<String>,
        client: &ClientMeta,
    ) -> Result<(User, IssuedSession), ServiceError> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(ServiceError::Validation("Invalid email format".into()));
        }
        check_password_strength(&password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(&password)?;
        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let user = User::new_local(
            &email,
            password_hash.into_string(),
            display_name,
            self.clock.now(),
        );

        self.store.insert_user(&user).await.map_err(|e| {
            if e.violated_constraint().is_some() {
                ServiceError::EmailAlreadyRegistered
            } else {
                ServiceError::Store(e)
            }
        })?;

        tracing::info!(user_id = %user.user_id, "User registered");

        let session = self
            .sessions
            .open(user.user_id, client, AuditAction::Signup)
            .await?;
        Ok((user, session))
    }

    /// Unknown email, wrong password, password-less and inactive users are all the
    /// same `InvalidCredentials` to the caller.
    pub async fn login(
        &self,
        email: &str,
        password: Password,
        client: &ClientMeta,
    ) -> Result<(User, IssuedSession), ServiceError> {
        let found = self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?;

        let (user, hash) = match found {
            Some(user) => match user.password_hash.clone() {
                Some(hash) => (user, PasswordHashString::new(hash)),
                None => {
                    tracing::info!(user_id = %user.user_id, "Password login for account without password");
                    return Err(self.reject_without_hash(&password));
                }
            },
            None => {
                tracing::info!("Password login for unknown email");
                return Err(self.reject_without_hash(&password));
            }
        };

        if !verify_password(&password, &hash) {
            tracing::info!(user_id = %user.user_id, "Password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active() {
            tracing::warn!(user_id = %user.user_id, "Login attempt for inactive account");
            return Err(ServiceError::InvalidCredentials);
        }

        let session = self.sessions.create(user.user_id, client).await?;
        Ok((user, session))
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: Password,
        new: Password,
        client: &ClientMeta,
    ) -> Result<(), ServiceError> {
        let user = self.active_user(user_id).await?;
        let hash = user
            .password_hash
            .clone()
            .ok_or(ServiceError::PasswordNotSet)?;

        if !verify_password(&current, &PasswordHashString::new(hash)) {
            return Err(ServiceError::InvalidCredentials);
        }
        check_password_strength(&new)?;

        let new_hash = hash_password(&new)?;
        self.store
            .update_password_hash(user_id, new_hash.as_str())
            .await?;

        self.audit
            .record(
                self.audit
                    .entry(AuditAction::PasswordChange, Some(user_id))
                    .target("user", user_id)
                    .client(client),
            )
            .await;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// First password for a user that so far only signs in through a provider.
    pub async fn set_password(
        &self,
        user_id: Uuid,
        new: Password,
        client: &ClientMeta,
    ) -> Result<(), ServiceError> {
        let user = self.active_user(user_id).await?;
        if user.has_password() {
            return Err(ServiceError::PasswordAlreadySet);
        }
        check_password_strength(&new)?;

        let new_hash = hash_password(&new)?;
        self.store
            .update_password_hash(user_id, new_hash.as_str())
            .await?;

        self.audit
            .record(
                self.audit
                    .entry(AuditAction::PasswordSet, Some(user_id))
                    .target("user", user_id)
                    .client(client),
            )
            .await;
        tracing::info!(user_id = %user_id, "Password set");
        Ok(())
    }

    /// `None` leaves a field unchanged; an empty display name clears it.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        display_name: Option<String>,
        profile_picture: Option<String>,
        client: &ClientMeta,
    ) -> Result<User, ServiceError> {
        let before = self.active_user(user_id).await?;

        let mut after = before.clone();
        if let Some(name) = display_name {
            let name = name.trim().to_string();
            after.display_name = (!name.is_empty()).then_some(name);
        }
        if let Some(picture) = profile_picture {
            let picture = picture.trim().to_string();
            after.profile_picture = (!picture.is_empty()).then_some(picture);
        }

        self.store
            .update_profile(
                user_id,
                after.display_name.as_deref(),
                after.profile_picture.as_deref(),
            )
            .await?;

        self.audit
            .record(
                self.audit
                    .entry(AuditAction::ProfileUpdate, Some(user_id))
                    .target("user", user_id)
                    .before(profile_snapshot(&before))
                    .after(profile_snapshot(&after))
                    .client(client),
            )
            .await;
        Ok(after)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        let user = self.get_user(user_id).await?;
        if !user.is_active() {
            return Err(ServiceError::AccountInactive);
        }
        Ok(user)
    }
}

fn check_password_strength(password: &Password) -> Result<(), ServiceError> {
    if password.as_str().chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn profile_snapshot(user: &User) -> serde_json::Value {
    json!({
        "display_name": user.display_name,
        "profile_picture": user.profile_picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditLogEntry, UserStatus};
    use crate::services::clock::ManualClock;
    use crate::services::memory::InMemoryIdentityStore;
    use chrono::Utc;

    struct Harness {
        store: Arc<InMemoryIdentityStore>,
        sessions: SessionStore,
        auth: AuthService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let audit = AuditLogger::new(store.clone(), clock.clone());
        let sessions = SessionStore::new(store.clone(), clock.clone(), audit.clone());
        let auth = AuthService::new(store.clone(), sessions.clone(), audit, clock);
        Harness {
            store,
            sessions,
            auth,
        }
    }

    fn pw(s: &str) -> Password {
        Password::new(s.to_string())
    }

    fn last_audit(store: &InMemoryIdentityStore) -> AuditLogEntry {
        store.audit_entries().pop().expect("audit entry")
    }

    #[tokio::test]
    async fn test_register_opens_session_with_signup_audit() {
        let h = harness();
        let (user, session) = h
            .auth
            .register(" Me@X.com ", pw("correct horse"), Some("Me".into()), &ClientMeta::default())
            .await
            .unwrap();

        assert_eq!(user.email, "me@x.com");
        assert!(!user.email_verified);
        assert!(h.sessions.verify(&session.token).await.unwrap().is_some());
        assert_eq!(last_audit(&h.store).action(), "signup");
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_short_passwords() {
        let h = harness();
        h.auth
            .register("me@x.com", pw("correct horse"), None, &ClientMeta::default())
            .await
            .unwrap();

        let err = h
            .auth
            .register("ME@x.com", pw("another one"), None, &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));

        let err = h
            .auth
            .register("new@x.com", pw("short"), None, &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        let (user, _) = h
            .auth
            .register("me@x.com", pw("correct horse"), None, &ClientMeta::default())
            .await
            .unwrap();
        let oauth_only = User::new_external("g@x.com", None, None, Utc::now());
        h.store.insert_user(&oauth_only).await.unwrap();

        for (email, password) in [
            ("nobody@x.com", "correct horse"),
            ("me@x.com", "wrong password"),
            ("g@x.com", "correct horse"),
        ] {
            let err = h
                .auth
                .login(email, pw(password), &ClientMeta::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidCredentials), "{}", email);
        }

        h.store
            .update_user_status(user.user_id, UserStatus::Suspended)
            .await
            .unwrap();
        let err = h
            .auth
            .login("me@x.com", pw("correct horse"), &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_non_ascii_email_logs_in_with_any_casing() {
        let h = harness();
        let (user, _) = h
            .auth
            .register("Élodie@Example.com", pw("correct horse"), None, &ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(user.email, "élodie@example.com");

        let (logged_in, _) = h
            .auth
            .login(" ÉLODIE@EXAMPLE.COM ", pw("correct horse"), &ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(logged_in.user_id, user.user_id);

        let duplicate = h
            .auth
            .register("élodie@example.com", pw("correct horse"), None, &ClientMeta::default())
            .await;
        assert!(matches!(duplicate, Err(ServiceError::EmailAlreadyRegistered)));
    }

    #[test]
    fn test_timing_hash_costs_the_same_as_a_real_hash() {
        let h = harness();
        let timing = h.auth.timing_hash().expect("timing hash prepared");
        let real = hash_password(&pw("correct horse")).unwrap();

        let timing_parsed = argon2::PasswordHash::new(timing.as_str()).unwrap();
        let real_parsed = argon2::PasswordHash::new(real.as_str()).unwrap();
        assert_eq!(
            timing_parsed.algorithm.to_string(),
            real_parsed.algorithm.to_string()
        );
        assert_eq!(
            timing_parsed.params.to_string(),
            real_parsed.params.to_string()
        );
        assert!(!verify_password(&pw(""), timing));
        assert!(!verify_password(&pw("correct horse"), timing));
    }

    #[tokio::test]
    async fn test_login_records_login() {
        let h = harness();
        h.auth
            .register("me@x.com", pw("correct horse"), None, &ClientMeta::default())
            .await
            .unwrap();
        let client = ClientMeta {
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
        };

        h.auth
            .login("ME@x.com", pw("correct horse"), &client)
            .await
            .unwrap();

        let entry = last_audit(&h.store);
        assert_eq!(entry.action(), "login");
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_change_password() {
        let h = harness();
        let (user, _) = h
            .auth
            .register("me@x.com", pw("correct horse"), None, &ClientMeta::default())
            .await
            .unwrap();

        let err = h
            .auth
            .change_password(user.user_id, pw("wrong"), pw("battery staple"), &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        h.auth
            .change_password(
                user.user_id,
                pw("correct horse"),
                pw("battery staple"),
                &ClientMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(last_audit(&h.store).action(), "password_change");

        assert!(h
            .auth
            .login("me@x.com", pw("battery staple"), &ClientMeta::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_set_password_only_for_password_less_users() {
        let h = harness();
        let oauth_only = User::new_external("g@x.com", None, None, Utc::now());
        h.store.insert_user(&oauth_only).await.unwrap();

        h.auth
            .set_password(oauth_only.user_id, pw("battery staple"), &ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(last_audit(&h.store).action(), "password_set");

        let err = h
            .auth
            .set_password(oauth_only.user_id, pw("another one"), &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PasswordAlreadySet));

        assert!(h
            .auth
            .login("g@x.com", pw("battery staple"), &ClientMeta::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_profile_records_before_and_after() {
        let h = harness();
        let (user, _) = h
            .auth
            .register("me@x.com", pw("correct horse"), Some("Old".into()), &ClientMeta::default())
            .await
            .unwrap();

        let updated = h
            .auth
            .update_profile(
                user.user_id,
                Some("New".into()),
                Some("https://img/me.png".into()),
                &ClientMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("New"));

        let entry = last_audit(&h.store);
        assert_eq!(entry.action(), "profile_update");
        assert_eq!(entry.before_data.unwrap()["display_name"], "Old");
        assert_eq!(entry.after_data.unwrap()["profile_picture"], "https://img/me.png");

        let stored = h.store.find_user_by_id(user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("New"));
    }
}
