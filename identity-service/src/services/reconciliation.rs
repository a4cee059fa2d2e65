//! Identity reconciliation: decides what an incoming external identity does to the
//! local User/Account model.
//!
//! Every branch ends in a [`ReconcileOutcome`]. Rejections carry no side effects.
//! Uniqueness is checked optimistically and enforced by the store; a uniqueness
//! violation at commit time re-runs the decision once against fresh state, so a
//! lost race lands on the same rejection a sequential request would have seen.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::audit::AuditLogger;
use super::clock::Clock;
use super::error::ServiceError;
use super::session::{IssuedSession, SessionStore};
use super::store::{IdentityStore, StoreError};
use crate::models::{
    normalize_email, Account, AuditAction, ClientMeta, ExternalProfile, OAuthIntent, OAuthPurpose,
    Provider, StateRecord, TokenSet, User,
};

/// Why an external identity was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The email belongs to a user with no account for this provider.
    EmailRegisteredWithoutProvider,
    /// The email's user is linked to a different subject at this provider.
    ProviderLinkedToDifferentIdentity,
    /// Linking: the external subject is already bound to another user.
    SubjectLinkedElsewhere,
    /// Linking: the caller already has an account for this provider.
    ProviderAlreadyLinked,
    /// Linking: the caller's session no longer resolves to the user who started the flow.
    SessionMismatch,
    /// The matched user exists but is suspended or otherwise not active.
    AccountInactive,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::EmailRegisteredWithoutProvider => "email_registered_without_provider",
            RejectReason::ProviderLinkedToDifferentIdentity => "provider_linked_to_different_identity",
            RejectReason::SubjectLinkedElsewhere => "subject_linked_elsewhere",
            RejectReason::ProviderAlreadyLinked => "provider_already_linked",
            RejectReason::SessionMismatch => "session_mismatch",
            RejectReason::AccountInactive => "account_inactive",
        }
    }

    /// Human-readable message for the browser. Provider affiliation is disclosed on
    /// purpose so the user knows how to recover.
    pub fn message(&self, provider: Provider) -> String {
        let name = provider.label();
        match self {
            RejectReason::EmailRegisteredWithoutProvider => format!(
                "This email is already registered. Sign in with your password, then link {} from your profile.",
                name
            ),
            RejectReason::ProviderLinkedToDifferentIdentity => {
                format!("This email is linked to a different {} account.", name)
            }
            RejectReason::SubjectLinkedElsewhere => {
                format!("This {} account is already linked to another user.", name)
            }
            RejectReason::ProviderAlreadyLinked => format!(
                "Your account already has a {} account linked. Unlink it first.",
                name
            ),
            RejectReason::SessionMismatch => {
                "Your session expired. Please sign in and restart linking.".to_string()
            }
            RejectReason::AccountInactive => "This account is not active.".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// A new session was opened. `created` is true when the user was created by this call.
    SignedIn {
        user: User,
        session: IssuedSession,
        created: bool,
    },
    /// An account was added to the caller; the caller's session is untouched.
    Linked { user_id: Uuid, account: Account },
    Rejected(RejectReason),
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn IdentityStore>,
    sessions: SessionStore,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sessions: SessionStore,
        audit: AuditLogger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sessions,
            audit,
            clock,
        }
    }

    /// Apply a verified external identity according to the redeemed state.
    ///
    /// `caller_session` is the raw session token presented with the callback, used
    /// only by `link`.
    pub async fn reconcile(
        &self,
        record: &StateRecord,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        caller_session: Option<&str>,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let outcome = match record.intent {
            OAuthIntent::Signin => self.sign_in(record.provider, profile, tokens, client).await?,
            OAuthIntent::Link { user_id } => {
                self.link(record.provider, user_id, profile, tokens, caller_session, client)
                    .await?
            }
        };

        match &outcome {
            ReconcileOutcome::Rejected(reason) => tracing::warn!(
                provider = %record.provider,
                purpose = %record.purpose(),
                reason = reason.as_str(),
                "External identity rejected"
            ),
            ReconcileOutcome::SignedIn { user, created, .. } => tracing::info!(
                provider = %record.provider,
                purpose = %OAuthPurpose::Signin,
                user_id = %user.user_id,
                created,
                "External sign-in completed"
            ),
            ReconcileOutcome::Linked { user_id, .. } => tracing::info!(
                provider = %record.provider,
                purpose = %OAuthPurpose::Link,
                user_id = %user_id,
                "External account linked"
            ),
        }
        Ok(outcome)
    }

    async fn sign_in(
        &self,
        provider: Provider,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        match self.try_sign_in(provider, profile, tokens, client).await {
            Err(ServiceError::Store(e)) if is_conflict(&e) => {
                tracing::info!(
                    provider = %provider,
                    constraint = ?e.violated_constraint(),
                    "Sign-in lost a uniqueness race, re-checking"
                );
                self.try_sign_in(provider, profile, tokens, client).await
            }
            other => other,
        }
    }

    async fn try_sign_in(
        &self,
        provider: Provider,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let email = normalize_email(&profile.email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            // The subject may already be known under an older email.
            if let Some(account) = self
                .store
                .find_account_by_subject(provider, &profile.subject)
                .await?
            {
                let owner = self
                    .store
                    .find_user_by_id(account.user_id)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("Account {} has no owning user", account.account_id)
                    })?;
                return self.open_existing(owner, client).await;
            }

            let now = self.clock.now();
            let user = User::new_external(
                &email,
                profile.name.clone(),
                profile.picture.clone(),
                now,
            );
            let account = Account::new(user.user_id, provider, profile, tokens, now);
            self.store.insert_user_with_account(&user, &account).await?;

            let session = self
                .sessions
                .open(user.user_id, client, AuditAction::Signup)
                .await?;
            return Ok(ReconcileOutcome::SignedIn {
                user,
                session,
                created: true,
            });
        };

        match self.store.find_account_for_user(user.user_id, provider).await? {
            Some(account) if account.provider_subject_id == profile.subject => {
                self.open_existing(user, client).await
            }
            Some(_) => Ok(ReconcileOutcome::Rejected(
                RejectReason::ProviderLinkedToDifferentIdentity,
            )),
            None => Ok(ReconcileOutcome::Rejected(
                RejectReason::EmailRegisteredWithoutProvider,
            )),
        }
    }

    async fn open_existing(
        &self,
        user: User,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if !user.is_active() {
            return Ok(ReconcileOutcome::Rejected(RejectReason::AccountInactive));
        }
        let session = self
            .sessions
            .open(user.user_id, client, AuditAction::Login)
            .await?;
        Ok(ReconcileOutcome::SignedIn {
            user,
            session,
            created: false,
        })
    }

    async fn link(
        &self,
        provider: Provider,
        bound_user: Uuid,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        caller_session: Option<&str>,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let caller = match caller_session {
            Some(token) => self.sessions.verify(token).await?,
            None => None,
        };
        if caller.map(|identity| identity.user_id) != Some(bound_user) {
            return Ok(ReconcileOutcome::Rejected(RejectReason::SessionMismatch));
        }

        match self.try_link(provider, bound_user, profile, tokens, client).await {
            Err(ServiceError::Store(e)) if is_conflict(&e) => {
                tracing::info!(
                    provider = %provider,
                    user_id = %bound_user,
                    constraint = ?e.violated_constraint(),
                    "Link lost a uniqueness race, re-checking"
                );
                self.try_link(provider, bound_user, profile, tokens, client)
                    .await
            }
            other => other,
        }
    }

    async fn try_link(
        &self,
        provider: Provider,
        user_id: Uuid,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        client: &ClientMeta,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if let Some(existing) = self
            .store
            .find_account_by_subject(provider, &profile.subject)
            .await?
        {
            let reason = if existing.user_id == user_id {
                RejectReason::ProviderAlreadyLinked
            } else {
                RejectReason::SubjectLinkedElsewhere
            };
            return Ok(ReconcileOutcome::Rejected(reason));
        }

        if self
            .store
            .find_account_for_user(user_id, provider)
            .await?
            .is_some()
        {
            return Ok(ReconcileOutcome::Rejected(
                RejectReason::ProviderAlreadyLinked,
            ));
        }

        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Ok(ReconcileOutcome::Rejected(RejectReason::SessionMismatch));
        };

        let account = Account::new(user_id, provider, profile, tokens, self.clock.now());
        let backfill = match user.profile_picture {
            None => profile.picture.as_deref(),
            Some(_) => None,
        };
        self.store.insert_account(&account, backfill).await?;

        self.audit
            .record(
                self.audit
                    .entry(AuditAction::AccountLink, Some(user_id))
                    .target("account", account.account_id)
                    .after(json!({
                        "provider": provider.as_str(),
                        "provider_subject_id": account.provider_subject_id,
                        "picture_backfilled": backfill.is_some(),
                    }))
                    .client(client),
            )
            .await;

        Ok(ReconcileOutcome::Linked { user_id, account })
    }
}

fn is_conflict(err: &StoreError) -> bool {
    err.violated_constraint().is_some()
}
