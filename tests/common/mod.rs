use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;

use sso_portal::{
    build_router,
    config::{
        Environment, PortalConfig, ProviderConfig, RateLimitConfig, RedisConfig, RegisteredApp,
        SecurityConfig, SsoConfig, SwaggerConfig, SwaggerMode,
    },
    middleware::create_ip_rate_limiter,
    services::{MockSessionProvider, RecoveryService, SessionContext, SsoService},
    sso::InMemoryDeferredStore,
    AppState,
};

pub const TRAX_ORIGIN: &str = "https://trax.supermatt.agency";
pub const SUBZ_ORIGIN: &str = "https://subz.supermatt.agency";

pub fn test_config() -> PortalConfig {
    PortalConfig {
        environment: Environment::Dev,
        service_name: "sso-portal-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "debug".to_string(),
        port: 8080,
        public_base_url: "http://localhost:8080".to_string(),
        provider: ProviderConfig {
            url: "http://provider.local".to_string(),
            api_key: "test-key".to_string(),
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        security: SecurityConfig {
            allowed_redirect_origins: vec![
                TRAX_ORIGIN.to_string(),
                SUBZ_ORIGIN.to_string(),
                "http://localhost:3000".to_string(),
            ],
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        },
        sso: SsoConfig {
            deferred_ttl_seconds: 86400,
            recovery_dedupe_ttl_seconds: 3600,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            register_attempts: 100,
            register_window_seconds: 60,
            password_reset_attempts: 100,
            password_reset_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
        apps: vec![
            RegisteredApp {
                slug: "trax".to_string(),
                name: "Trax".to_string(),
                url: TRAX_ORIGIN.to_string(),
                callback_path: "/sso-callback".to_string(),
            },
            RegisteredApp {
                slug: "subz".to_string(),
                name: "Subz".to_string(),
                url: SUBZ_ORIGIN.to_string(),
                callback_path: "/api/auth/sso-callback".to_string(),
            },
        ],
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<MockSessionProvider>,
    pub recovery_provider: Arc<MockSessionProvider>,
    pub store: Arc<InMemoryDeferredStore>,
    pub sessions: SessionContext,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(MockSessionProvider::new(), test_config())
    }

    pub fn with_provider(provider: MockSessionProvider) -> Self {
        Self::build(provider, test_config())
    }

    pub fn build(provider: MockSessionProvider, config: PortalConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();

        let provider = Arc::new(provider);
        let recovery_provider = Arc::new(MockSessionProvider::new());
        let store = Arc::new(InMemoryDeferredStore::new());
        let sessions = SessionContext::new();

        let allowlist = config
            .redirect_allowlist()
            .expect("test allow-list must parse");
        let sso = SsoService::new(
            provider.clone(),
            store.clone(),
            allowlist,
            config.apps.clone(),
            config.sso.deferred_ttl_seconds,
        );
        let recovery = RecoveryService::new(
            recovery_provider.clone(),
            store.clone(),
            config.sso.recovery_dedupe_ttl_seconds,
        );

        let state = AppState {
            config: config.clone(),
            provider: provider.clone(),
            recovery_provider: recovery_provider.clone(),
            store: store.clone(),
            sessions: sessions.clone(),
            sso,
            recovery,
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            register_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.register_attempts,
                config.rate_limit.register_window_seconds,
            ),
            password_reset_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.password_reset_attempts,
                config.rate_limit.password_reset_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
        };

        let router = build_router(state).expect("Failed to build router");
        Self {
            router,
            provider,
            recovery_provider,
            store,
            sessions,
        }
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .extension(axum::extract::ConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))))
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Cookie", cookie)
        .extension(axum::extract::ConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .extension(axum::extract::ConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json_with_cookie(uri: &str, cookie: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Cookie", cookie)
        .extension(axum::extract::ConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// First Set-Cookie value matching the named cookie, as `name=value`.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
