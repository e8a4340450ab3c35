use crate::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Provider rejected the request; the message is surfaced to the user
    /// verbatim (bad credentials, duplicate email, provider password policy).
    #[error("{0}")]
    Provider(String),

    /// Provider could not be reached at all.
    #[error("Session provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// Terminal recovery state: the one-time credential is missing, expired,
    /// malformed, or already consumed. Only a fresh emailed link recovers.
    #[error("Recovery link invalid or expired")]
    RecoveryLinkInvalid,

    #[error("Application not found")]
    AppNotFound,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Redis(e) => AppError::RedisError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Provider(msg) => AppError::AuthError(anyhow::anyhow!(msg)),
            ServiceError::ProviderUnreachable(msg) => AppError::ProviderUnreachable(msg),
            ServiceError::NotAuthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Not authenticated"))
            }
            ServiceError::RecoveryLinkInvalid => AppError::RecoveryLinkInvalid,
            ServiceError::AppNotFound => {
                AppError::NotFound(anyhow::anyhow!("Application not found"))
            }
        }
    }
}
