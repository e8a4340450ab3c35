use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::auth::{LoginContext, LoginRequest, LoginResponse, MessageResponse, RedirectQuery},
    error::AppError,
    handlers::auth::{decode_cookie, removal_cookie, session_cookie},
    services::session::PORTAL_COOKIE,
    sso::handoff::LOGIN_ROUTE,
    utils::ValidatedJson,
    AppState,
};

/// Login screen entry point.
///
/// An already-authenticated visitor arriving with a trusted redirect is
/// handed off immediately, without credential re-entry. Everyone else gets
/// the login screen context; an untrusted redirect is dropped from it.
#[utoipa::path(
    get,
    path = "/login",
    params(RedirectQuery),
    responses(
        (status = 200, description = "Login screen context", body = LoginContext),
        (status = 303, description = "Implicit hand-off for a live session")
    ),
    tag = "SSO"
)]
pub async fn login_screen(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(cookie) = decode_cookie(&jar, PORTAL_COOKIE) {
        if let Some((session, decision)) = state
            .sso
            .resume_login(&cookie, query.redirect.as_deref())
            .await
        {
            state.sessions.publish(Some(&session));
            let jar = jar.add(session_cookie(
                PORTAL_COOKIE,
                "/",
                &session,
                state.config.secure_cookies(),
            ));
            return Ok((jar, Redirect::to(decision.location())).into_response());
        }
    }

    let redirect = state
        .sso
        .allowlist()
        .validate_redirect(query.redirect.as_deref());
    Ok(Json(LoginContext {
        authenticated: false,
        redirect,
    })
    .into_response())
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    params(RedirectQuery),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "Session provider unreachable", body = ErrorResponse)
    ),
    tag = "SSO"
)]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (session, decision) = state
        .sso
        .login(&req.email, &req.password, query.redirect.as_deref())
        .await?;

    state.sessions.publish(Some(&session));
    let jar = jar.add(session_cookie(
        PORTAL_COOKIE,
        "/",
        &session,
        state.config.secure_cookies(),
    ));

    let next = decision.location().to_string();
    Ok((
        StatusCode::OK,
        jar,
        Json(LoginResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user: session.user,
            next,
        }),
    ))
}

/// Logout and clear the portal session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "SSO"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    // Optimistic teardown: the cookie and the published session go away
    // now, the provider-side invalidation happens in the background.
    if let Some(cookie) = decode_cookie(&jar, PORTAL_COOKIE) {
        let provider = state.provider.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.sign_out(&cookie.access_token).await {
                tracing::warn!(error = %e, "Background sign-out failed");
            }
        });
    }

    state.sessions.publish(None);
    let jar = jar.remove(removal_cookie(PORTAL_COOKIE, "/"));

    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
            next: Some(LOGIN_ROUTE.to_string()),
        }),
    ))
}
