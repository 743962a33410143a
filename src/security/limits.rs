//! Request body ceiling and content-type enforcement.
//!
//! # Responsibilities
//! - Buffer the request body up to the configured ceiling
//! - Reject mutating requests whose body has an unexpected media type
//!
//! # Design Decisions
//! - A declared `Content-Length` over the ceiling is refused before reading
//! - Bodies without a declared length are cut off at the ceiling while streaming
//! - Content-type is only enforced when a body is present

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, StatusCode},
};
use http_body_util::LengthLimitError;
use std::error::Error as _;
use thiserror::Error;

use crate::http::response::{ErrorCode, Rejection};

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read body: {0}")]
    Read(String),
}

impl BodyError {
    pub fn to_rejection(&self) -> Rejection {
        match self {
            BodyError::TooLarge { limit } => Rejection::payload_too_large(*limit),
            BodyError::Read(_) => Rejection::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
                "Request body could not be read",
            ),
        }
    }
}

/// Declared length, if any and parseable.
pub fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Buffer `body`, refusing anything over `limit` bytes.
pub async fn read_body(declared: Option<usize>, body: Body, limit: usize) -> Result<Bytes, BodyError> {
    if declared.is_some_and(|len| len > limit) {
        return Err(BodyError::TooLarge { limit });
    }

    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let is_limit = e
            .source()
            .is_some_and(|source| source.is::<LengthLimitError>())
            || e.to_string().contains("length limit exceeded");
        if is_limit {
            BodyError::TooLarge { limit }
        } else {
            BodyError::Read(e.to_string())
        }
    })
}

/// Media type without parameters, lowercased.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Check a mutating request's media type against the allowlist.
pub fn check_content_type(
    method: &Method,
    headers: &HeaderMap,
    body_len: usize,
    allowed: &[String],
) -> Result<(), Rejection> {
    if !is_mutating(method) || body_len == 0 {
        return Ok(());
    }

    match media_type(headers) {
        Some(media) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&media)) => Ok(()),
        _ => Err(Rejection::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::UnsupportedMediaType,
            "Unsupported content type",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn allowed() -> Vec<String> {
        crate::config::LimitsConfig::default().allowed_content_types
    }

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        h
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("2048"));
        let err = read_body(declared_length(&h), Body::from(vec![0u8; 16]), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit() {
        let err = read_body(None, Body::from(vec![b'a'; 2048]), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { .. }));
        assert_eq!(err.to_rejection().status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_within_limit() {
        let bytes = read_body(None, Body::from("hello"), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn test_content_type_rules() {
        let allowed = allowed();
        assert!(check_content_type(&Method::POST, &headers("application/json; charset=utf-8"), 10, &allowed).is_ok());
        assert!(check_content_type(&Method::PUT, &headers("multipart/form-data; boundary=x"), 10, &allowed).is_ok());

        let err = check_content_type(&Method::POST, &headers("text/plain"), 10, &allowed).unwrap_err();
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.code, ErrorCode::UnsupportedMediaType);

        // Missing header with a body is refused
        assert!(check_content_type(&Method::PATCH, &HeaderMap::new(), 10, &allowed).is_err());
        // Empty bodies and safe methods are not checked
        assert!(check_content_type(&Method::POST, &HeaderMap::new(), 0, &allowed).is_ok());
        assert!(check_content_type(&Method::GET, &headers("text/plain"), 10, &allowed).is_ok());
    }
}
