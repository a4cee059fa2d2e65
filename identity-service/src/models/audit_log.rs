//! Audit log model - append-only record of security-relevant actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ClientMeta;

/// Audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Signup,
    AccountLink,
    PasswordChange,
    PasswordSet,
    ProfileUpdate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::Signup => "signup",
            AuditAction::AccountLink => "account_link",
            AuditAction::PasswordChange => "password_change",
            AuditAction::PasswordSet => "password_set",
            AuditAction::ProfileUpdate => "profile_update",
        }
    }
}

/// Audit log entry. Never updated or deleted once written.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    pub action_code: String,
    pub actor_user_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub before_data: Option<serde_json::Value>,
    pub after_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create an entry for an action performed by `actor`.
    pub fn new(action: AuditAction, actor: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            action_code: action.as_str().to_string(),
            actor_user_id: actor,
            target_type: None,
            target_id: None,
            before_data: None,
            after_data: None,
            ip_address: None,
            user_agent: None,
            created_utc: now,
        }
    }

    pub fn target(mut self, target_type: &str, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn before(mut self, snapshot: serde_json::Value) -> Self {
        self.before_data = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: serde_json::Value) -> Self {
        self.after_data = Some(snapshot);
        self
    }

    pub fn client(mut self, client: &ClientMeta) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    pub fn action(&self) -> &str {
        &self.action_code
    }
}
