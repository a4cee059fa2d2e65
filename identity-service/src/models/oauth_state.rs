//! OAuth CSRF state - single-use correlator between an authorization redirect and
//! its callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Provider;

/// Declared purpose of an OAuth round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthPurpose {
    Signin,
    Link,
}

impl OAuthPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthPurpose::Signin => "signin",
            OAuthPurpose::Link => "link",
        }
    }
}

impl std::fmt::Display for OAuthPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "signin" => Ok(OAuthPurpose::Signin),
            "link" => Ok(OAuthPurpose::Link),
            _ => Err(format!("Invalid OAuth purpose: {}", s)),
        }
    }
}

/// Purpose together with its user binding. A `link` always carries the user who
/// started it; a `signin` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthIntent {
    Signin,
    Link { user_id: Uuid },
}

impl OAuthIntent {
    pub fn purpose(&self) -> OAuthPurpose {
        match self {
            OAuthIntent::Signin => OAuthPurpose::Signin,
            OAuthIntent::Link { .. } => OAuthPurpose::Link,
        }
    }

    pub fn bound_user(&self) -> Option<Uuid> {
        match self {
            OAuthIntent::Signin => None,
            OAuthIntent::Link { user_id } => Some(*user_id),
        }
    }
}

/// Persisted state row, keyed by the SHA-256 of the state token.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state_hash: String,
    pub provider_code: String,
    pub purpose_code: String,
    pub user_id: Option<Uuid>,
    pub redirect_target: Option<String>,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl OAuthState {
    pub fn new(
        state_hash: String,
        provider: Provider,
        intent: OAuthIntent,
        redirect_target: Option<String>,
        expires_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state_hash,
            provider_code: provider.as_str().to_string(),
            purpose_code: intent.purpose().as_str().to_string(),
            user_id: intent.bound_user(),
            redirect_target,
            expires_utc,
            created_utc: now,
        }
    }

    /// Typed view of the row. `None` if the row does not describe a valid intent.
    pub fn to_record(&self) -> Option<StateRecord> {
        let provider = self.provider_code.parse().ok()?;
        let intent = match (self.purpose_code.parse().ok()?, self.user_id) {
            (OAuthPurpose::Signin, None) => OAuthIntent::Signin,
            (OAuthPurpose::Link, Some(user_id)) => OAuthIntent::Link { user_id },
            _ => return None,
        };
        Some(StateRecord {
            provider,
            intent,
            redirect_target: self.redirect_target.clone(),
            expires_utc: self.expires_utc,
        })
    }
}

/// A successfully redeemed state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub provider: Provider,
    pub intent: OAuthIntent,
    pub redirect_target: Option<String>,
    pub expires_utc: DateTime<Utc>,
}

impl StateRecord {
    pub fn purpose(&self) -> OAuthPurpose {
        self.intent.purpose()
    }
}
