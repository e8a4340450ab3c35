mod common;

use axum::http::StatusCode;
use tower::util::ServiceExt;

use common::{body_json, get, post_json, test_config, TestApp};
use sso_portal::services::MockSessionProvider;

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["redis"], "up");
}

#[tokio::test]
async fn security_headers_are_present() {
    let app = TestApp::new();

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert!(response.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn login_attempts_are_rate_limited_per_ip() {
    let mut config = test_config();
    config.rate_limit.login_attempts = 2;
    config.rate_limit.login_window_seconds = 3600;
    let app = TestApp::build(MockSessionProvider::new(), config);

    let body = serde_json::json!({ "email": "user@example.com", "password": "nope" });

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(post_json("/auth/login", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .router
        .clone()
        .oneshot(post_json("/auth/login", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}
