//! OAuth CSRF state manager: single-use correlators between an authorization
//! redirect and its callback.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::clock::Clock;
use super::error::ServiceError;
use super::store::IdentityStore;
use crate::models::{OAuthIntent, OAuthPurpose, OAuthState, Provider, StateRecord};
use crate::utils::{generate_token, hash_token};

pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct OAuthStateManager {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl OAuthStateManager {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a state for `purpose`. `link` requires the caller's user id and
    /// `signin` must not carry one.
    pub async fn issue(
        &self,
        provider: Provider,
        purpose: OAuthPurpose,
        user_id: Option<Uuid>,
        redirect_target: Option<String>,
    ) -> Result<String, ServiceError> {
        let intent = match (purpose, user_id) {
            (OAuthPurpose::Signin, None) => OAuthIntent::Signin,
            (OAuthPurpose::Link, Some(user_id)) => OAuthIntent::Link { user_id },
            (OAuthPurpose::Signin, Some(_)) => {
                return Err(ServiceError::InvalidStateRequest(
                    "signin state must not be bound to a user".to_string(),
                ))
            }
            (OAuthPurpose::Link, None) => {
                return Err(ServiceError::InvalidStateRequest(
                    "link state requires the authenticated user".to_string(),
                ))
            }
        };
        self.issue_intent(provider, intent, redirect_target).await
    }

    pub async fn issue_intent(
        &self,
        provider: Provider,
        intent: OAuthIntent,
        redirect_target: Option<String>,
    ) -> Result<String, ServiceError> {
        let token = generate_token();
        let now = self.clock.now();
        let state = OAuthState::new(
            hash_token(&token),
            provider,
            intent,
            redirect_target,
            now + Duration::minutes(STATE_TTL_MINUTES),
            now,
        );
        self.store.insert_oauth_state(&state).await?;

        tracing::debug!(
            provider = %provider,
            purpose = %intent.purpose(),
            "OAuth state issued"
        );
        Ok(token)
    }

    /// Delete the state and return it if it was still valid.
    ///
    /// The row is gone after this call whatever the outcome, so a second call on the
    /// same token always yields `None`.
    pub async fn redeem(&self, token: &str) -> Result<Option<StateRecord>, ServiceError> {
        let Some(row) = self.store.take_oauth_state(&hash_token(token)).await? else {
            return Ok(None);
        };

        if row.expires_utc <= self.clock.now() {
            tracing::info!(
                provider = %row.provider_code,
                purpose = %row.purpose_code,
                user_id = ?row.user_id,
                "Expired OAuth state redeemed"
            );
            return Ok(None);
        }

        let record = row.to_record();
        if record.is_none() {
            tracing::warn!(
                provider = %row.provider_code,
                purpose = %row.purpose_code,
                "Malformed OAuth state row discarded"
            );
        }
        Ok(record)
    }

    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        let removed = self
            .store
            .delete_oauth_states_expired_before(self.clock.now())
            .await?;
        tracing::info!(removed, "Expired OAuth states swept");
        Ok(removed)
    }
}
