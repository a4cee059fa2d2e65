use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{AuthResponse, LoginRequest, SessionResponse},
    handlers::cookies::{cleared_session_cookie, session_cookie, SESSION_COOKIE},
    middleware::{AuthUser, ClientInfo},
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with email and password
///
/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, issued) = state
        .auth_service
        .login(&req.email, Password::new(req.password), &client)
        .await?;

    let jar = jar.add(session_cookie(issued.token, state.config.cookie_secure()));
    Ok((
        StatusCode::OK,
        jar,
        Json(AuthResponse {
            user: user.sanitized(),
        }),
    ))
}

/// Destroy the current session and clear the cookie. Safe to call without one.
///
/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value(), &client).await?;
    }

    let jar = jar.add(cleared_session_cookie(state.config.cookie_secure()));
    Ok((
        StatusCode::OK,
        jar,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

/// GET /auth/session
pub async fn current_session(user: AuthUser) -> impl IntoResponse {
    Json(SessionResponse {
        authenticated: true,
        identity: user.identity,
    })
}

/// Issue a short-lived bearer token for the caller's browser session.
///
/// POST /auth/token
pub async fn issue_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_session()?;
    let token = state.tokens.issue(user.identity.user_id)?;
    tracing::info!(user_id = %user.identity.user_id, "Short-lived token issued");
    Ok(Json(token))
}
