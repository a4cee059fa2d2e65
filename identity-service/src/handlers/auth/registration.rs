use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{AuthResponse, RegisterRequest},
    handlers::cookies::session_cookie,
    middleware::ClientInfo,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Register a password account and open a session.
///
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, issued) = state
        .auth_service
        .register(&req.email, Password::new(req.password), req.name, &client)
        .await?;

    let jar = jar.add(session_cookie(issued.token, state.config.cookie_secure()));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: user.sanitized(),
        }),
    ))
}
