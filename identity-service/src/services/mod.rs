//! Services layer for identity-service.
//!
//! The identity core (sessions, short-lived tokens, OAuth states, the Google exchange
//! and reconciliation) plus local password accounts, all on top of the
//! [`IdentityStore`] persistence seam.

pub mod audit;
pub mod auth;
pub mod clock;
mod database;
pub mod error;
pub mod google;
pub mod memory;
pub mod oauth_state;
pub mod reconciliation;
pub mod session;
pub mod store;
pub mod token;

pub use audit::AuditLogger;
pub use auth::AuthService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::PgIdentityStore;
pub use error::ServiceError;
pub use google::GoogleClient;
pub use memory::InMemoryIdentityStore;
pub use oauth_state::OAuthStateManager;
pub use reconciliation::{ReconcileOutcome, ReconciliationEngine, RejectReason};
pub use session::{IssuedSession, SessionStore};
pub use store::{IdentityStore, StoreError};
pub use token::{TokenClaims, TokenIssuer, TokenResponse};
