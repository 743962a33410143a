//! Request identification.
//!
//! # Responsibilities
//! - Generate and propagate a request ID (UUID v4) via tower-http
//! - Derive the client key (IP) the limiters and audit events use
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `X-Forwarded-For` is only believed when the listener is told it sits
//!   behind a proxy
//! - A request with no usable address is keyed as "unknown" rather than skipped

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, Request},
};
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Client address as resolved by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolve the client IP for a request.
pub fn resolve_client_ip(req: &Request<Body>, trust_proxy: bool) -> ClientIp {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ClientIp(ip.to_string());
        }
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => ClientIp(addr.ip().to_string()),
        None => ClientIp("unknown".to_string()),
    }
}

/// Client IP previously attached by the pipeline, falling back to the peer.
pub fn client_ip_of(req: &Request<Body>) -> String {
    match req.extensions().get::<ClientIp>() {
        Some(ip) => ip.0.clone(),
        None => resolve_client_ip(req, false).0,
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_ip(&req, true).as_str(), "203.0.113.9");
        assert_eq!(resolve_client_ip(&req, false).as_str(), "unknown");
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        let addr: SocketAddr = "198.51.100.4:55123".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(resolve_client_ip(&req, true).as_str(), "198.51.100.4");
    }

    #[test]
    fn test_pipeline_ip_wins() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(ClientIp("192.0.2.1".into()));
        assert_eq!(client_ip_of(&req), "192.0.2.1");
    }
}
