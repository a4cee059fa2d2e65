//! User model - the identity anchor shared by password and external accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User lifecycle status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

/// Canonical form of an email address: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User entity.
///
/// A user must always be reachable: it holds a password hash, a linked external
/// account, or both.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub profile_picture: Option<String>,
    pub status_code: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a local (password) user. The email is not verified yet.
    pub fn new_local(
        email: &str,
        password_hash: String,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: normalize_email(email),
            email_verified: false,
            display_name,
            password_hash: Some(password_hash),
            profile_picture: None,
            status_code: UserStatus::Active.as_str().to_string(),
            created_utc: now,
        }
    }

    /// Create a user from an external identity. The provider already verified the email.
    pub fn new_external(
        email: &str,
        display_name: Option<String>,
        profile_picture: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: normalize_email(email),
            email_verified: true,
            display_name,
            password_hash: None,
            profile_picture,
            status_code: UserStatus::Active.as_str().to_string(),
            created_utc: now,
        }
    }

    pub fn status(&self) -> Option<UserStatus> {
        self.status_code.parse().ok()
    }

    /// Unknown status codes count as inactive.
    pub fn is_active(&self) -> bool {
        self.status() == Some(UserStatus::Active)
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// User response for API (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub has_password: bool,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email.clone(),
            email_verified: u.email_verified,
            display_name: u.display_name.clone(),
            profile_picture: u.profile_picture.clone(),
            has_password: u.has_password(),
            status: u.status_code.clone(),
            created_utc: u.created_utc,
        }
    }
}
