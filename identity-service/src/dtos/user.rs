use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub display_name: Option<String>,

    #[validate(url(message = "Profile picture must be a URL"))]
    pub profile_picture: Option<String>,
}

/// Change (with `current_password`) or first-time set (without) of the password.
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordRequest {
    pub current_password: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}
