use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{handlers::cookies::SESSION_COOKIE, models::AuthIdentity, AppState};

/// Which credential authenticated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Opaque session cookie.
    Session,
    /// Short-lived bearer token.
    Bearer,
}

/// Middleware to require authentication.
///
/// Accepts the session cookie or `Authorization: Bearer <short-lived token>`. A
/// present but invalid bearer token is rejected even when a cookie is also sent.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let (identity, source) = if let Some(token) = bearer {
        let identity = state.tokens.verify(&token).await?;
        (identity, AuthSource::Bearer)
    } else if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let identity = state.sessions.verify(cookie.value()).await?;
        (identity, AuthSource::Session)
    } else {
        (None, AuthSource::Session)
    };

    let Some(identity) = identity else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid credentials"
        )));
    };

    tracing::debug!(user_id = %identity.user_id, source = ?source, "Request authenticated");

    // Store identity in request extensions so handlers can access it
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(source);

    Ok(next.run(req).await)
}

/// Extractor to easily get the caller in handlers
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: AuthIdentity,
    pub source: AuthSource,
}

impl AuthUser {
    /// Reject callers that did not present the session cookie.
    pub fn require_session(&self) -> Result<(), AppError> {
        match self.source {
            AuthSource::Session => Ok(()),
            AuthSource::Bearer => Err(AppError::Forbidden(anyhow::anyhow!(
                "This operation requires a browser session"
            ))),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<AuthIdentity>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth identity missing from request extensions"
            ))
        })?;
        let source = parts
            .extensions
            .get::<AuthSource>()
            .copied()
            .unwrap_or(AuthSource::Session);

        Ok(AuthUser { identity, source })
    }
}
