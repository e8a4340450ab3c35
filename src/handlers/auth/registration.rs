use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::auth::{CallbackQuery, RedirectQuery, RegisterRequest, RegisterResponse},
    error::AppError,
    handlers::auth::{decode_cookie, session_cookie},
    services::session::PORTAL_COOKIE,
    utils::ValidatedJson,
    AppState,
};

/// OAuth providers the portal forwards to. Anything else is refused before
/// the provider is contacted.
const OAUTH_PROVIDERS: &[&str] = &["google", "github", "apple"];

/// Register a new account.
///
/// No session exists until the confirmation email is opened, so a trusted
/// redirect is parked for the callback to consume. The response reveals
/// whether one was parked, never the rejected value.
#[utoipa::path(
    post,
    path = "/auth/register",
    params(RedirectQuery),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, confirmation pending", body = RegisterResponse),
        (status = 401, description = "Provider rejected the registration", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "SSO"
)]
pub async fn register(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let redirect_pending = state
        .sso
        .register(
            &req.email,
            &req.password,
            req.full_name.as_deref(),
            query.redirect.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email to confirm your account."
                .to_string(),
            redirect_pending,
        }),
    ))
}

/// Email-confirmation and OAuth completion callback.
///
/// Resolves a session from the code (or the ambient cookie on a reload),
/// consumes the deferred redirect exactly once, and answers with the
/// hand-off navigation or the portal landing route.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Hand-off or portal landing")
    ),
    tag = "SSO"
)]
pub async fn confirm_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let cookie = decode_cookie(&jar, PORTAL_COOKIE);
    let (session, decision) = state
        .sso
        .complete_callback(query.code.as_deref(), cookie.as_ref())
        .await?;

    let jar = match &session {
        Some(session) => {
            state.sessions.publish(Some(session));
            jar.add(session_cookie(
                PORTAL_COOKIE,
                "/",
                session,
                state.config.secure_cookies(),
            ))
        }
        None => jar,
    };

    Ok((jar, Redirect::to(decision.location())))
}

/// Start an OAuth sign-in.
///
/// A trusted redirect is parked before the user leaves for the provider;
/// the callback above is the shared consumption point for both flows.
#[utoipa::path(
    get,
    path = "/auth/oauth/{provider}",
    params(
        ("provider" = String, Path, description = "OAuth provider name"),
        RedirectQuery
    ),
    responses(
        (status = 303, description = "Forwarded to the provider's authorize endpoint"),
        (status = 400, description = "Unknown provider", body = ErrorResponse)
    ),
    tag = "SSO"
)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !OAUTH_PROVIDERS.contains(&provider.as_str()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unknown OAuth provider: {}",
            provider
        )));
    }

    let callback = format!(
        "{}/auth/callback",
        state.config.public_base_url.trim_end_matches('/')
    );
    let authorize = format!(
        "{}/auth/v1/authorize?provider={}&redirect_to={}",
        state.config.provider.url.trim_end_matches('/'),
        provider,
        urlencoding::encode(&callback)
    );

    let target = state
        .sso
        .oauth_start(authorize, query.redirect.as_deref())
        .await?;
    Ok(Redirect::to(&target))
}
