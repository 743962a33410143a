//! Tests against a real listener.

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use hearth_guard::{HttpServer, Shutdown};

mod common;
use common::{seeded_store, test_config};

async fn start(server: HttpServer) -> (String, Shutdown, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, shutdown).await.unwrap();
        })
    };
    (format!("http://{}", addr), shutdown, handle)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_health_and_graceful_shutdown() {
    let server = HttpServer::new(test_config(), Arc::new(seeded_store())).unwrap();
    let (base, shutdown, handle) = start(server).await;

    let res = client().get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_strict_tier_keys_on_peer_address() {
    let sensitive = Router::new().route("/api/orders/export", get(|| async { "export" }));
    let server = HttpServer::new(test_config(), Arc::new(seeded_store()))
        .unwrap()
        .with_sensitive_routes(sensitive);
    let (base, shutdown, _handle) = start(server).await;
    let client = client();

    for _ in 0..3 {
        let res = client
            .get(format!("{base}/api/orders/export"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(res.headers().contains_key("ratelimit-remaining"));
    }

    let res = client
        .get(format!("{base}/api/orders/export"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert!(res.headers().contains_key("retry-after"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let server = HttpServer::new(test_config(), Arc::new(seeded_store())).unwrap();
    let (base, shutdown, _handle) = start(server).await;

    let res = client().get(format!("{base}/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    shutdown.trigger();
}
