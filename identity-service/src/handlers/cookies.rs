//! Session cookie. Carries the opaque session token and nothing else.

use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::services::session::SESSION_TTL_DAYS;

pub const SESSION_COOKIE: &str = "session_token";

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

/// Expired cookie that makes the browser drop the session token.
pub fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let header = session_cookie("tok".into(), true).to_string();
        assert!(header.starts_with("session_token=tok"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Secure"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=604800"));

        assert!(!session_cookie("tok".into(), false).to_string().contains("Secure"));
    }

    #[test]
    fn test_cleared_cookie_expires_immediately() {
        let header = cleared_session_cookie(false).to_string();
        assert!(header.contains("Max-Age=0"));
    }
}
