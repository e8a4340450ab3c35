pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod services;
pub mod sso;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::PortalConfig;
use crate::error::AppError;
use crate::middleware::{
    ip_rate_limit_middleware, request_id_middleware, security_headers_middleware, IpRateLimiter,
};
use crate::services::{RecoveryService, SessionContext, SessionProvider, SsoService};
use crate::sso::DeferredStore;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login_screen,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::registration::register,
        handlers::auth::registration::confirm_callback,
        handlers::auth::registration::oauth_start,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::recovery_session,
        handlers::auth::password::recovery_password,
        handlers::apps::launch_app,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::LoginContext,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::PasswordResetRequest,
            dtos::auth::RecoverySessionRequest,
            dtos::auth::RecoverySessionResponse,
            dtos::auth::RecoveryPasswordRequest,
            dtos::auth::MessageResponse,
            services::provider::ProviderUser,
        )
    ),
    tags(
        (name = "SSO", description = "Login, registration and token hand-off"),
        (name = "Recovery", description = "Password recovery flow"),
        (name = "Applications", description = "Registered application launch"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: PortalConfig,
    /// Ambient provider handle backing the portal session.
    pub provider: Arc<dyn SessionProvider>,
    /// Dedicated provider handle for the recovery flow. Kept separate so
    /// recovery credential material never touches the ambient session.
    pub recovery_provider: Arc<dyn SessionProvider>,
    pub store: Arc<dyn DeferredStore>,
    pub sessions: SessionContext,
    pub sso: SsoService,
    pub recovery: RecoveryService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Credential-bearing routes each get their own rate budget
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let register_limiter = state.register_rate_limiter.clone();
    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            register_limiter,
            ip_rate_limit_middleware,
        ));

    let reset_limiter = state.password_reset_rate_limiter.clone();
    let recovery_routes = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/recovery/session",
            post(handlers::auth::recovery_session),
        )
        .route(
            "/auth/recovery/password",
            post(handlers::auth::recovery_password),
        )
        .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/login", get(handlers::auth::login_screen))
        .route("/auth/callback", get(handlers::auth::confirm_callback))
        .route("/auth/oauth/:provider", get(handlers::auth::oauth_start))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/apps/:slug/launch", get(handlers::apps::launch_app))
        .merge(login_route)
        .merge(register_route)
        .merge(recovery_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .cors_allowed_origins
                        .iter()
                        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
                            Ok(value) => Some(value),
                            Err(e) => {
                                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                                None
                            }
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Deferred store health check failed");
        AppError::InternalError(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "redis": "up"
        }
    })))
}
