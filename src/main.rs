use sso_portal::{
    build_router,
    config::PortalConfig,
    middleware::create_ip_rate_limiter,
    observability::init_tracing,
    services::{HttpSessionProvider, RecoveryService, SessionContext, SessionProvider, SsoService},
    sso::RedisDeferredStore,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), sso_portal::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = PortalConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting SSO portal"
    );

    let allowlist = config.redirect_allowlist()?;
    tracing::info!(
        origins = config.security.allowed_redirect_origins.len(),
        apps = config.apps.len(),
        "Redirect allow-list loaded"
    );

    let store = RedisDeferredStore::new(&config.redis.url).await?;
    let store: Arc<dyn sso_portal::sso::DeferredStore> = Arc::new(store);
    tracing::info!("Deferred redirect store initialized");

    let recovery_redirect = format!(
        "{}/auth/recovery",
        config.public_base_url.trim_end_matches('/')
    );

    // Two provider handles: the ambient one for the portal session and a
    // dedicated one for recovery, so the flows cannot contaminate each other.
    let provider: Arc<dyn SessionProvider> = Arc::new(HttpSessionProvider::new(
        &config.provider.url,
        &config.provider.api_key,
        &recovery_redirect,
    ));
    let recovery_provider: Arc<dyn SessionProvider> = Arc::new(HttpSessionProvider::new(
        &config.provider.url,
        &config.provider.api_key,
        &recovery_redirect,
    ));

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

    let sessions = SessionContext::new();
    spawn_session_observer(&sessions, provider.clone());

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let register_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.register_attempts,
        config.rate_limit.register_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login, Register, Password Reset, and Global IP");

    let state = AppState {
        config: config.clone(),
        provider,
        recovery_provider,
        store,
        sessions,
        sso,
        recovery,
        login_rate_limiter,
        register_rate_limiter,
        password_reset_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Follow the session-change channel and revalidate each new session with
/// the provider. Best-effort: a failed lookup is logged, never surfaced.
fn spawn_session_observer(sessions: &SessionContext, provider: Arc<dyn SessionProvider>) {
    let mut rx = sessions.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            match snapshot {
                Some(snapshot) => match provider.fetch_user(&snapshot.access_token).await {
                    Ok(user) => {
                        tracing::debug!(user_id = %user.id, "Session change observed")
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Session change revalidation failed")
                    }
                },
                None => tracing::debug!("Session cleared"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
