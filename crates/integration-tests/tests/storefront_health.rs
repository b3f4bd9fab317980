//! Health checks, the backend banner and request plumbing.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use green_basket_integration_tests::TestApp;
use green_basket_storefront::liveness::{BackendStatus, OFFLINE_BANNER};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.browser().get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_readiness_without_database() {
    let app = TestApp::new();
    let response = app.browser().get("/health/ready").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"database": "disabled", "backend": "online"})
    );
}

#[tokio::test]
async fn test_backend_status_online_has_no_banner() {
    let app = TestApp::new();
    let status = app.browser().get("/api/backend-status").await.json();

    assert_eq!(status, json!({"status": "online", "banner": null}));
}

#[tokio::test]
async fn test_backend_status_offline_shows_banner() {
    let app = TestApp::builder().backend(BackendStatus::Offline).build();
    let status = app.browser().get("/api/backend-status").await.json();

    assert_eq!(status["status"], "offline");
    assert_eq!(status["banner"], OFFLINE_BANNER);
}

#[tokio::test]
async fn test_backend_status_checking_shows_banner() {
    let app = TestApp::builder().backend(BackendStatus::Checking).build();
    let status = app.browser().get("/api/backend-status").await.json();

    assert_eq!(status["status"], "checking");
    assert_eq!(status["banner"], OFFLINE_BANNER);
}

#[tokio::test]
async fn test_request_id_is_echoed_or_generated() {
    let app = TestApp::new();
    let browser = app.browser();

    let request = Request::get("/health")
        .header("x-request-id", "edge-1234")
        .body(Body::empty())
        .unwrap();
    let echoed = browser.send(request).await;
    assert_eq!(
        echoed.headers.get("x-request-id").unwrap(),
        "edge-1234"
    );

    let generated = browser.get("/health").await;
    let id = generated.headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(!id.is_empty());
    assert_ne!(id, "edge-1234");
}

#[tokio::test]
async fn test_unknown_path_is_json_not_found() {
    let app = TestApp::new();
    let response = app.browser().get("/nowhere").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.json()["error"].is_string());
}
