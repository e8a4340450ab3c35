use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::{
    error::AppError,
    handlers::auth::{decode_cookie, removal_cookie, session_cookie},
    services::{session::PORTAL_COOKIE, ServiceError},
    sso::handoff::LOGIN_ROUTE,
    AppState,
};

/// Launch a registered application.
///
/// Fetches a fresh token and forwards to the application's callback URL
/// with the token attached. A dead session lands back on the login screen.
#[utoipa::path(
    get,
    path = "/apps/{slug}/launch",
    params(
        ("slug" = String, Path, description = "Registered application slug")
    ),
    responses(
        (status = 303, description = "Hand-off to the application, or login screen"),
        (status = 404, description = "Unknown application", body = ErrorResponse)
    ),
    tag = "Applications"
)]
pub async fn launch_app(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(cookie) = decode_cookie(&jar, PORTAL_COOKIE) else {
        return Ok(Redirect::to(LOGIN_ROUTE).into_response());
    };

    let app = state
        .config
        .find_app(&slug)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown application: {}", slug)))?
        .clone();

    match state.sso.launch_app(&cookie, &app).await {
        Ok((session, url)) => {
            state.sessions.publish(Some(&session));
            let jar = jar.add(session_cookie(
                PORTAL_COOKIE,
                "/",
                &session,
                state.config.secure_cookies(),
            ));
            Ok((jar, Redirect::to(&url)).into_response())
        }
        Err(ServiceError::NotAuthenticated) => {
            state.sessions.publish(None);
            let jar = jar.remove(removal_cookie(PORTAL_COOKIE, "/"));
            Ok((jar, Redirect::to(LOGIN_ROUTE)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
