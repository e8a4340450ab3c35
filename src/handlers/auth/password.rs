use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::auth::{
        MessageResponse, PasswordResetRequest, RecoveryPasswordRequest, RecoverySessionRequest,
        RecoverySessionResponse,
    },
    error::AppError,
    handlers::auth::{decode_cookie, removal_cookie, session_cookie},
    services::{
        recovery::{RecoveryCredentials, RecoveryFlow},
        session::{RECOVERY_COOKIE, RECOVERY_COOKIE_PATH},
        ServiceError,
    },
    sso::handoff::LOGIN_ROUTE,
    utils::ValidatedJson,
    AppState,
};

/// Request a password-recovery email.
///
/// The response is identical whether or not the address has an account.
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Recovery email dispatched if the account exists", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "Session provider unreachable", body = ErrorResponse)
    ),
    tag = "Recovery"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    match state.recovery_provider.send_recovery_email(&req.email).await {
        Ok(()) => {}
        Err(ServiceError::Provider(msg)) => {
            // Account existence is not disclosed by the response.
            tracing::debug!(error = %msg, "Recovery email refused by provider");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(MessageResponse {
        message: "If an account exists for that address, a recovery email has been sent."
            .to_string(),
        next: None,
    }))
}

/// Exchange a recovery-link fragment for a recovery session.
///
/// Each emailed credential is honored at most once; a replay answers with
/// the same terminal invalid-link error as a malformed fragment. A request
/// without a fragment credential falls back to the session the recovery
/// cookie already holds (page reload during the flow); only when neither
/// exists is the link declared invalid.
#[utoipa::path(
    post,
    path = "/auth/recovery/session",
    request_body = RecoverySessionRequest,
    responses(
        (status = 200, description = "Recovery session established", body = RecoverySessionResponse),
        (status = 400, description = "Invalid or expired link", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Recovery"
)]
pub async fn recovery_session(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RecoverySessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if RecoveryCredentials::from_fragment(&req.fragment).is_none() {
        // No fresh credential: resume from the cookie without consuming
        // anything.
        let cookie =
            decode_cookie(&jar, RECOVERY_COOKIE).ok_or(AppError::RecoveryLinkInvalid)?;
        let user = state.recovery.resume(&cookie).await?;
        return Ok((
            StatusCode::OK,
            jar,
            Json(RecoverySessionResponse {
                message: "Recovery session resumed. Choose a new password.".to_string(),
                email: user.email,
            }),
        ));
    }

    let flow = RecoveryFlow::new(state.recovery.clone());
    let session = flow.bootstrap(&req.fragment).await?;

    // Path-scoped: recovery requests never see the ambient portal session
    // and the portal never sees this one.
    let jar = jar.add(session_cookie(
        RECOVERY_COOKIE,
        RECOVERY_COOKIE_PATH,
        &session,
        state.config.secure_cookies(),
    ));

    Ok((
        StatusCode::OK,
        jar,
        Json(RecoverySessionResponse {
            message: "Recovery session established. Choose a new password.".to_string(),
            email: session.user.email,
        }),
    ))
}

/// Set a new password on an active recovery session.
#[utoipa::path(
    post,
    path = "/auth/recovery/password",
    request_body = RecoveryPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "No valid recovery session", body = ErrorResponse),
        (status = 401, description = "Provider rejected the update", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Recovery"
)]
pub async fn recovery_password(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RecoveryPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cookie = decode_cookie(&jar, RECOVERY_COOKIE).ok_or(AppError::RecoveryLinkInvalid)?;

    // Provider refusals surface verbatim and leave the recovery session in
    // place; the user can correct the password and resubmit.
    state.recovery.update_password(&cookie, &req.password).await?;

    // Success is terminal: the recovery session is torn down and must not
    // be usable for a second change.
    state.recovery.sign_out_background(cookie.access_token);
    let jar = jar.remove(removal_cookie(RECOVERY_COOKIE, RECOVERY_COOKIE_PATH));

    Ok((
        jar,
        Json(MessageResponse {
            message: "Password updated. Sign in with your new password.".to_string(),
            next: Some(LOGIN_ROUTE.to_string()),
        }),
    ))
}
