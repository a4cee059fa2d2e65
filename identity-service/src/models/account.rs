//! External-provider accounts bound to a user, and the validated provider payloads
//! they are built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// External identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
        }
    }

    /// Human-readable name used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            _ => Err(format!("Invalid identity provider: {}", s)),
        }
    }
}

/// Tokens returned by the provider's token endpoint, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

/// Profile of the external identity, after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Account entity: one external identity bound to exactly one user.
///
/// `(provider_code, provider_subject_id)` is globally unique and `(user_id, provider_code)`
/// is unique, both enforced by the store.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub provider_code: String,
    pub provider_subject_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_utc: Option<DateTime<Utc>>,
    pub profile_snapshot: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    pub fn new(
        user_id: Uuid,
        provider: Provider,
        profile: &ExternalProfile,
        tokens: &TokenSet,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            user_id,
            provider_code: provider.as_str().to_string(),
            provider_subject_id: profile.subject.clone(),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            expires_utc: tokens.expires_in.map(|secs| now + Duration::seconds(secs)),
            profile_snapshot: serde_json::to_value(profile).unwrap_or(serde_json::Value::Null),
            created_utc: now,
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        self.provider_code.parse().ok()
    }
}
