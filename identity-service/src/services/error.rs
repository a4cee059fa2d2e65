use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("User not found")]
    UserNotFound,

    #[error("Account is not active")]
    AccountInactive,

    #[error("No password is set for this account")]
    PasswordNotSet,

    #[error("A password is already set for this account")]
    PasswordAlreadySet,

    #[error("Invalid OAuth state request: {0}")]
    InvalidStateRequest(String),

    #[error("Authorization code exchange failed: {0}")]
    CodeExchangeFailed(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("Invalid provider payload: {0}")]
    InvalidProviderPayload(String),

    #[error("Provider reports the email as unverified")]
    UnverifiedEmail,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    Unauthenticated,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(StoreError::UniqueViolation { constraint }) => {
                AppError::Conflict(anyhow::anyhow!("Conflicting record ({})", constraint))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account is not active"))
            }
            ServiceError::PasswordNotSet => {
                AppError::BadRequest(anyhow::anyhow!("No password is set for this account"))
            }
            ServiceError::PasswordAlreadySet => AppError::Conflict(anyhow::anyhow!(
                "A password is already set for this account"
            )),
            ServiceError::InvalidStateRequest(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::CodeExchangeFailed(e) | ServiceError::ProfileFetchFailed(e) => {
                AppError::BadGateway(e)
            }
            ServiceError::InvalidProviderPayload(e) => AppError::BadGateway(e),
            ServiceError::UnverifiedEmail => {
                AppError::Forbidden(anyhow::anyhow!("Provider email is not verified"))
            }
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Not authenticated"))
            }
        }
    }
}
