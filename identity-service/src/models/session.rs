//! Session model - durable, revocable proof of authentication.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::User;

/// Client metadata captured when a session is opened. Audit only, never used for
/// authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Session entity. Keyed by the SHA-256 of the opaque token handed to the client.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_utc: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(
        token_hash: String,
        user_id: Uuid,
        ttl: Duration,
        client: &ClientMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_hash,
            user_id,
            expires_utc: now + ttl,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            created_utc: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }
}

/// Who the caller is, as resolved from a session or a short-lived token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

impl From<&User> for AuthIdentity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        }
    }
}
