use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::services::provider::ProviderUser;

/// The untrusted `redirect` query parameter accepted by the SSO entry
/// points. Honored only when it survives allow-list validation; otherwise
/// silently dropped.
#[derive(Debug, Deserialize, IntoParams)]
pub struct RedirectQuery {
    #[param(example = "https://trax.supermatt.agency")]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: ProviderUser,
    /// In-portal route the client should navigate to next.
    #[schema(example = "/apps")]
    pub next: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    #[schema(example = "password123")]
    pub confirm_password: String,

    #[schema(example = "Max Mustermann")]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "Registration successful. Please check your email to confirm your account.")]
    pub message: String,
    /// Whether an allowed redirect was parked for after the confirmation.
    pub redirect_pending: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    /// Confirmation/OAuth completion code, exchanged with the provider.
    pub code: Option<String>,
}

/// Login screen context for an anonymous (or fallen-back) visitor.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginContext {
    pub authenticated: bool,
    /// The redirect parameter, echoed back iff it is trusted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecoverySessionRequest {
    /// Raw URL fragment from the emailed recovery link
    /// (`access_token=...&refresh_token=...&type=recovery`). Empty on a
    /// page reload, where the recovery cookie carries the session instead.
    #[serde(default)]
    pub fragment: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecoverySessionResponse {
    #[schema(example = "Recovery session established. Choose a new password.")]
    pub message: String,
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecoveryPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newpassword123", min_length = 8)]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    #[schema(example = "newpassword123")]
    pub confirm_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
    /// In-portal route the client should navigate to next, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}
