//! Tier limiters and the progressive throttle on mounted route groups.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

use hearth_guard::observability::SecurityEventKind;

mod common;
use common::{bearer_get, body_json, build_app, build_app_with, json_post, test_config, PASSWORD};

fn catalogue() -> Router {
    Router::new()
        .route("/api/products", get(|| async { "products" }))
        .route("/api/analytics/events", post(|| async { "ok" }))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_tier_blocks_past_limit() {
    let mut config = test_config();
    config.rate_limit.api.max_development = 2;
    let app = build_app_with(config, |server| server.with_api_routes(catalogue()));

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(get_request("/api/products"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(body_json(response).await["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(app.audit.count(SecurityEventKind::RateLimitExceeded), 1);
}

#[tokio::test]
async fn test_api_tier_skips_analytics_in_development() {
    let mut config = test_config();
    config.rate_limit.api.max_development = 2;
    let app = build_app_with(config, |server| server.with_api_routes(catalogue()));

    for _ in 0..5 {
        let response = app
            .router
            .clone()
            .oneshot(json_post("/api/analytics/events", json!({"event": "view"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Skipped requests left the budget untouched
    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_tier_blocks_past_limit() {
    let mut config = test_config();
    config.rate_limit.admin.max_development = 2;
    let app = build_app(config);

    let login = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/auth/login",
            json!({ "email": "admin@hearth.example", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    let body = body_json(login).await;
    let token = body["data"]["tokens"]["accessToken"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(bearer_get("/api/admin/session", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(bearer_get("/api/admin/session", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(app.audit.count(SecurityEventKind::AdminAccess), 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_delays_instead_of_rejecting() {
    let mut config = test_config();
    config.throttle.delay_after = 1;
    config.throttle.delay_ms = 500;
    config.throttle.max_delay_ms = 2_000;
    let app = build_app_with(config, |server| server.with_api_routes(catalogue()));

    let start = tokio::time::Instant::now();
    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() < Duration::from_millis(500));

    let start = tokio::time::Instant::now();
    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() >= Duration::from_millis(500));

    let start = tokio::time::Instant::now();
    let response = app
        .router
        .clone()
        .oneshot(get_request("/api/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() >= Duration::from_millis(1_000));
}
