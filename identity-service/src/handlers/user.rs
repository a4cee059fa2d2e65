use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::user::{PasswordRequest, UpdateProfileRequest},
    middleware::{AuthUser, ClientInfo},
    utils::{Password, ValidatedJson},
    AppState,
};

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth_service.get_user(user.identity.user_id).await?;
    Ok(Json(user.sanitized()))
}

/// PATCH /users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state
        .auth_service
        .update_profile(
            user.identity.user_id,
            req.display_name,
            req.profile_picture,
            &client,
        )
        .await?;

    Ok(Json(updated.sanitized()))
}

/// Change the password, or set a first one for accounts that only sign in through
/// a provider.
///
/// POST /users/me/password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.identity.user_id;
    let new_password = Password::new(req.new_password);

    let message = match req.current_password {
        Some(current) => {
            state
                .auth_service
                .change_password(user_id, Password::new(current), new_password, &client)
                .await?;
            "Password changed successfully"
        }
        None => {
            state
                .auth_service
                .set_password(user_id, new_password, &client)
                .await?;
            "Password set successfully"
        }
    };

    Ok(Json(serde_json::json!({ "message": message })))
}
