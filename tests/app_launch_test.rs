mod common;

use axum::http::StatusCode;
use tower::util::ServiceExt;

use common::{get, get_with_cookie, location, TestApp, SUBZ_ORIGIN, TRAX_ORIGIN};
use sso_portal::services::{MockSessionProvider, SessionCookie};

fn portal_cookie() -> String {
    let cookie = SessionCookie {
        access_token: "access-0".to_string(),
        refresh_token: "refresh-0".to_string(),
    };
    format!("sso_portal_session={}", cookie.encode())
}

#[tokio::test]
async fn launch_forwards_to_the_app_callback_with_a_fresh_token() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/apps/trax/launch", &portal_cookie()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/sso-callback?token=access-0", TRAX_ORIGIN)
    );
}

#[tokio::test]
async fn launch_uses_the_per_app_callback_path() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/apps/subz/launch", &portal_cookie()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/api/auth/sso-callback?token=access-0", SUBZ_ORIGIN)
    );
}

#[tokio::test]
async fn launch_without_a_session_lands_on_login() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get("/apps/trax/launch"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn launch_with_a_dead_session_clears_it_and_lands_on_login() {
    let provider = MockSessionProvider::new();
    provider
        .fail_refresh
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let app = TestApp::with_provider(provider);

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/apps/trax/launch", &portal_cookie()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cleared = common::set_cookie_value(&response, "sso_portal_session").unwrap();
    assert_eq!(cleared, "sso_portal_session=");
}

#[tokio::test]
async fn unknown_app_is_not_found() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/apps/nonesuch/launch", &portal_cookie()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
