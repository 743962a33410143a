//! Shared utilities for integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;

use hearth_guard::auth::{CredentialHasher, InMemoryUserStore, Role, UserRecord};
use hearth_guard::observability::{AuditLogger, MemoryAuditSink};
use hearth_guard::{GuardConfig, HttpServer};

pub const PASSWORD: &str = "correct horse battery staple";

/// Defaults with a cheap hash so tests stay fast.
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.auth.hash_memory_kib = 1024;
    config.auth.hash_iterations = 1;
    config.auth.hash_parallelism = 1;
    config
}

fn user(id: &str, email: &str, hash: &str, role: Role, active: bool, verified: bool) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        email: email.to_string(),
        password_hash: hash.to_string(),
        role,
        is_active: active,
        is_verified: verified,
    }
}

/// Admin, customer, disabled and unverified accounts sharing one password.
pub fn seeded_store() -> InMemoryUserStore {
    let hasher = CredentialHasher::with_params(1024, 1, 1).unwrap();
    let hash = hasher.hash(PASSWORD).unwrap();

    let store = InMemoryUserStore::new();
    store.insert(user("u-admin", "admin@hearth.example", &hash, Role::Admin, true, true));
    store.insert(user("u-cust", "customer@hearth.example", &hash, Role::Customer, true, true));
    store.insert(user("u-off", "disabled@hearth.example", &hash, Role::Customer, false, true));
    store.insert(user("u-new", "unverified@hearth.example", &hash, Role::Customer, true, false));
    store
}

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryUserStore,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn build_app(config: GuardConfig) -> TestApp {
    build_app_with(config, |server| server)
}

/// Like `build_app`, with a hook to mount extra route groups.
pub fn build_app_with(config: GuardConfig, mount: impl FnOnce(HttpServer) -> HttpServer) -> TestApp {
    let store = seeded_store();
    let audit = Arc::new(MemoryAuditSink::new());
    let server = HttpServer::with_audit(
        config,
        Arc::new(store.clone()),
        AuditLogger::new(audit.clone()),
    )
    .unwrap();
    let server = mount(server);
    TestApp {
        router: server.router(),
        store,
        audit,
    }
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
