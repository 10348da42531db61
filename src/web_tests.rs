#![cfg(test)]

use super::web::*;
use crate::config::StepTimeouts;
use crate::error::{PsegError, Result};
use crate::gateway::{BrowserLauncher, BrowserSession, CookieGateway, ManualCookieStore, PortalUrls};
use async_trait::async_trait;
use axum::http::{Request, StatusCode, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// Launcher whose browser never starts
#[derive(Default)]
struct BrokenLauncher {
    launches: AtomicUsize,
}

#[async_trait]
impl BrowserLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Err(PsegError::navigation("chromedriver not running"))
    }
}

fn test_state(dir: &tempfile::TempDir) -> (AppState, Arc<BrokenLauncher>) {
    let launcher = Arc::new(BrokenLauncher::default());
    let gateway = CookieGateway::new(
        launcher.clone(),
        ManualCookieStore::new(dir.path().join("manual_cookies.json")),
        PortalUrls::default(),
        StepTimeouts::default(),
    );
    (
        AppState::new(Arc::new(gateway), "https://mysmartenergy.nj.pseg.com"),
        launcher,
    )
}

async fn body_string(response: axum::response::Response) -> String {
    use http_body_util::BodyExt as _;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn health_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(&dir);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "psegli-automation");
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn root_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(&dir);
    let response = build_router(state)
        .oneshot(Request::builder().uri("/").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    if cfg!(feature = "openapi") {
        assert_eq!(location, "/docs");
    } else {
        assert_eq!(location, "/cookies");
    }
}

#[tokio::test]
async fn saved_cookies_empty_bank() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(&dir);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/cookies/get")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "No cookies saved. Visit /cookies to add them.");
}

#[tokio::test]
async fn post_cookies_form_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(&dir);
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cookies")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(axum::body::Body::from(
                    "cookies=+MM_SID%3Dabc%3B+__RequestVerificationToken%3Dxyz+",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Cookies saved successfully!"));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cookies/get")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["cookies"], "MM_SID=abc; __RequestVerificationToken=xyz");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/cookies")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_string(response).await;
    assert!(html.contains("Current saved cookies"));
    assert!(html.contains("MM_SID=abc"));
}

#[tokio::test]
async fn post_blank_cookies_shows_error_page() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(&dir);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cookies")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(axum::body::Body::from("cookies=+++"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("Failed to save cookies"));
    assert!(html.contains("Try again"));
}

#[tokio::test]
async fn login_uses_banked_cookies_without_browser() {
    let dir = tempfile::tempdir().unwrap();
    let (state, launcher) = test_state(&dir);
    state
        .gateway
        .manual()
        .save("MM_SID=banked; tracking=1")
        .unwrap();

    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(r#"{"username":"u","password":"p"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["cookies"], "MM_SID=banked");
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_form_reports_browser_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (state, launcher) = test_state(&dir);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login-form")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(axum::body::Body::from("username=u&password=p"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("chromedriver"));
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn login_without_password_skips_browser() {
    let dir = tempfile::tempdir().unwrap();
    let (state, launcher) = test_state(&dir);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(r#"{"username":"u","password":""}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}
