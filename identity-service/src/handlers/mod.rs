//! HTTP handlers for identity-service.

pub mod auth;
pub mod cookies;
pub mod user;
