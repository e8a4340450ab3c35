mod common;

use axum::http::StatusCode;
use std::sync::atomic::Ordering;
use tower::util::ServiceExt;

use common::{body_json, post_json, post_json_with_cookie, set_cookie_value, TestApp};

const FRAGMENT: &str = "#access_token=recov-abc&refresh_token=recov-ref&type=recovery";

#[tokio::test]
async fn recovery_link_establishes_a_path_scoped_session() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let raw_cookie = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sso_recovery_session="))
        .expect("recovery cookie set")
        .to_string();
    assert!(raw_cookie.contains("Path=/auth/recovery"));
    assert!(raw_cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["email"], "recovery@example.com");
}

#[tokio::test]
async fn replayed_recovery_link_is_terminal() {
    let app = TestApp::new();

    let first = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);

    let body = body_json(second).await;
    assert_eq!(
        body["error"],
        "The link is invalid or has expired. Please request a new one."
    );
    // The replay never reached the provider.
    assert_eq!(app.recovery_provider.set_session_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_reload_resumes_the_session_from_the_cookie() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie_value(&response, "sso_recovery_session").unwrap();

    // The reload re-posts without a fragment; the cookie carries the session.
    let reload = app
        .router
        .clone()
        .oneshot(post_json_with_cookie(
            "/auth/recovery/session",
            &cookie,
            serde_json::json!({ "fragment": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(reload.status(), StatusCode::OK);
    let body = body_json(reload).await;
    assert_eq!(body["email"], "user@example.com");
    // Resuming never re-exchanges the one-time credential.
    assert_eq!(app.recovery_provider.set_session_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reload_without_a_cookie_is_an_invalid_link() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.recovery_provider.set_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_fragment_is_an_invalid_link() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": "#access_token=abc&type=signup" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.recovery_provider.set_session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn password_update_completes_and_tears_down_the_session() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();
    let cookie = set_cookie_value(&response, "sso_recovery_session").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json_with_cookie(
            "/auth/recovery/password",
            &cookie,
            serde_json::json!({
                "password": "brandnewpass",
                "confirm_password": "brandnewpass"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookie_value(&response, "sso_recovery_session").unwrap();
    assert_eq!(cleared, "sso_recovery_session=");

    let body = body_json(response).await;
    assert_eq!(body["next"], "/login");
    assert_eq!(
        app.recovery_provider
            .update_password_calls
            .load(Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn short_password_never_reaches_the_provider() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/session",
            serde_json::json!({ "fragment": FRAGMENT }),
        ))
        .await
        .unwrap();
    let cookie = set_cookie_value(&response, "sso_recovery_session").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json_with_cookie(
            "/auth/recovery/password",
            &cookie,
            serde_json::json!({
                "password": "short7c",
                "confirm_password": "short7c"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        app.recovery_provider
            .update_password_calls
            .load(Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn password_update_without_a_recovery_session_is_refused() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/recovery/password",
            serde_json::json!({
                "password": "brandnewpass",
                "confirm_password": "brandnewpass"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_request_response_does_not_disclose_accounts() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/password-reset/request",
            serde_json::json!({ "email": "whoever@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["message"],
        "If an account exists for that address, a recovery email has been sent."
    );
    assert_eq!(
        app.recovery_provider
            .recovery_email_calls
            .load(Ordering::SeqCst),
        1
    );
}
