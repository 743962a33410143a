//! Stage capability and the request view stages work on.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request},
    response::Response,
};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::http::request::ClientIp;
use crate::http::response::Rejection;
use crate::security::tagging::SecurityTags;
use crate::security::upload::UploadedFile;

/// What a stage decided.
#[derive(Debug)]
pub enum StageOutcome {
    /// Hand over to the next stage.
    Continue,
    /// Terminal refusal.
    Reject(Rejection),
    /// Terminal answer that is not an error (preflight, honeypot decoy).
    Respond(Response),
}

/// One step of the fixed chain.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome;

    /// Runs after the response exists, for every stage that was executed.
    fn on_response(&self, _context: &RequestContext, _response: &mut Response) {}
}

/// A request as it moves through the chain.
#[derive(Debug)]
pub struct InboundRequest {
    parts: Parts,
    pending_body: Option<Body>,
    pub client_ip: ClientIp,
    /// Decoded query string as a JSON object.
    pub query: Value,
    /// Parsed body: JSON, form fields, or `Null`.
    pub body: Value,
    pub raw_body: Bytes,
    pub files: Vec<UploadedFile>,
    pub tags: SecurityTags,
    pub started: Instant,
}

impl InboundRequest {
    pub fn new(request: Request<Body>, client_ip: ClientIp) -> Self {
        let (parts, body) = request.into_parts();
        let query = parts
            .uri
            .query()
            .map(|q| pairs_to_object(decode_pairs(q.as_bytes())))
            .unwrap_or_else(|| Value::Object(Map::new()));
        Self {
            parts,
            pending_body: Some(body),
            client_ip,
            query,
            body: Value::Null,
            raw_body: Bytes::new(),
            files: Vec::new(),
            tags: SecurityTags::default(),
            started: Instant::now(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn raw_query(&self) -> &str {
        self.parts.uri.query().unwrap_or_default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn origin(&self) -> Option<&str> {
        self.parts
            .headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    /// Take the unread body. Only the first caller gets it.
    pub fn take_body(&mut self) -> Option<Body> {
        self.pending_body.take()
    }

    pub fn context(&self) -> RequestContext {
        RequestContext {
            method: self.parts.method.clone(),
            path: self.path().to_string(),
            client_ip: self.client_ip.0.clone(),
            origin: self.parts.headers.get(header::ORIGIN).cloned(),
            tags: self.tags,
            started: self.started,
        }
    }

    /// Rebuild the request for the handler, carrying the client IP and tags.
    pub fn into_request(self) -> Request<Body> {
        let body = match self.pending_body {
            Some(body) => body,
            None => Body::from(self.raw_body),
        };
        let mut request = Request::from_parts(self.parts, body);
        request.extensions_mut().insert(self.client_ip);
        request.extensions_mut().insert(self.tags);
        request
    }
}

/// What the post-response hooks get to see.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub client_ip: String,
    pub origin: Option<HeaderValue>,
    pub tags: SecurityTags,
    pub started: Instant,
}

/// Percent-decode `a=1&b=2` pairs. Undecodable input yields no pairs.
pub fn decode_pairs(raw: &[u8]) -> Vec<(String, String)> {
    serde_urlencoded::from_bytes(raw).unwrap_or_default()
}

/// Fold pairs into an object; repeated keys become arrays.
pub fn pairs_to_object(pairs: Vec<(String, String)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_folding() {
        let req = Request::builder()
            .uri("/api/products?tag=wood&tag=gas&q=stove%20fan")
            .body(Body::empty())
            .unwrap();
        let inbound = InboundRequest::new(req, ClientIp("1.1.1.1".into()));
        assert_eq!(inbound.query, json!({"tag": ["wood", "gas"], "q": "stove fan"}));
        assert_eq!(inbound.path(), "/api/products");
    }

    #[tokio::test]
    async fn test_into_request_carries_extensions() {
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let mut inbound = InboundRequest::new(req, ClientIp("1.1.1.1".into()));
        inbound.take_body();
        inbound.raw_body = Bytes::from_static(b"{}");
        inbound.tags.auth_route = true;

        let rebuilt = inbound.into_request();
        assert_eq!(rebuilt.extensions().get::<ClientIp>().unwrap().as_str(), "1.1.1.1");
        assert!(rebuilt.extensions().get::<SecurityTags>().unwrap().auth_route);
        let bytes = axum::body::to_bytes(rebuilt.into_body(), 16).await.unwrap();
        assert_eq!(&bytes[..], b"{}");
    }
}
