//! Short-lived, self-contained bearer tokens (HS256).
//!
//! A parallel credential to the session cookie for API callers. Expiry is checked
//! against the injected clock rather than the library's wall-clock check.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clock::Clock;
use super::error::ServiceError;
use super::store::IdentityStore;
use crate::config::TokenConfig;
use crate::models::AuthIdentity;

pub const TOKEN_TTL_MINUTES: i64 = 60;

/// Claims carried by a short-lived token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub user_id: Uuid,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token response returned to client
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig, store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        let secret = config.signing_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            store,
            clock,
        }
    }

    pub fn ttl_seconds() -> i64 {
        TOKEN_TTL_MINUTES * 60
    }

    pub fn issue(&self, user_id: Uuid) -> Result<TokenResponse, ServiceError> {
        let now = self.clock.now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(TOKEN_TTL_MINUTES)).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))?;

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: Self::ttl_seconds(),
        })
    }

    /// Check signature, issuer, audience and expiry. Any failure yields `None`.
    pub fn decode_claims(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let claims = match decode::<TokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected short-lived token");
                return None;
            }
        };

        if claims.exp <= self.clock.now().timestamp() || claims.sub != claims.user_id.to_string() {
            return None;
        }
        Some(claims)
    }

    /// Resolve a token to a live identity. Inactive or deleted users yield `None`.
    pub async fn verify(&self, token: &str) -> Result<Option<AuthIdentity>, ServiceError> {
        let Some(claims) = self.decode_claims(token) else {
            return Ok(None);
        };

        match self.store.find_user_by_id(claims.user_id).await? {
            Some(user) if user.is_active() => Ok(Some(AuthIdentity::from(&user))),
            _ => Ok(None),
        }
    }
}
