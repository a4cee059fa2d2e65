pub mod account;
pub mod audit_log;
pub mod oauth_state;
pub mod session;
pub mod user;

pub use account::{Account, ExternalProfile, Provider, TokenSet};
pub use audit_log::{AuditAction, AuditLogEntry};
pub use oauth_state::{OAuthIntent, OAuthPurpose, OAuthState, StateRecord};
pub use session::{AuthIdentity, ClientMeta, Session};
pub use user::{normalize_email, User, UserResponse, UserStatus};
