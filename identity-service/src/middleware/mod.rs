pub mod auth;
pub mod client_meta;

pub use auth::{auth_middleware, AuthSource, AuthUser};
pub use client_meta::ClientInfo;
