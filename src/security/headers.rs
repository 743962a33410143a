//! Response security headers and CORS headers.
//!
//! # Responsibilities
//! - Stamp the fixed security header set on every response, rejections included
//! - Echo an admitted `Origin` back with credentials allowed
//! - Answer CORS preflight requests
//!
//! # Design Decisions
//! - HSTS only in production; development runs over plain HTTP
//! - Existing headers set by a handler are not overwritten
//! - Origin is echoed rather than `*`, because credentials are allowed

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};

const PERMITTED_CROSS_DOMAIN: HeaderName =
    HeaderName::from_static("x-permitted-cross-domain-policies");

const HSTS: &str = "max-age=31536000; includeSubDomains";
const CSP: &str = "default-src 'self'; frame-ancestors 'none'";
const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Request-Id";

/// Add the fixed security headers, keeping any the handler already set.
pub fn apply_security_headers(headers: &mut HeaderMap, production: bool) {
    let fixed = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
        (header::CONTENT_SECURITY_POLICY, CSP),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            "same-origin",
        ),
        (PERMITTED_CROSS_DOMAIN, "none"),
    ];
    for (name, value) in fixed {
        headers
            .entry(name)
            .or_insert(HeaderValue::from_static(value));
    }
    if production {
        headers
            .entry(header::STRICT_TRANSPORT_SECURITY)
            .or_insert(HeaderValue::from_static(HSTS));
    }
}

/// Echo an admitted origin.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

pub fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// 204 answer to an admitted preflight.
pub fn preflight_response(max_age_secs: u64) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age_secs));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsts_only_in_production() {
        let mut dev = HeaderMap::new();
        apply_security_headers(&mut dev, false);
        assert!(!dev.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert_eq!(dev[header::X_FRAME_OPTIONS], "DENY");

        let mut prod = HeaderMap::new();
        apply_security_headers(&mut prod, true);
        assert_eq!(prod[header::STRICT_TRANSPORT_SECURITY], HSTS);
    }

    #[test]
    fn test_handler_headers_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        apply_security_headers(&mut headers, false);
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    }

    #[test]
    fn test_preflight_detection() {
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        assert!(is_preflight(&preflight));

        let plain = Request::builder()
            .method(Method::OPTIONS)
            .body(Body::empty())
            .unwrap();
        assert!(!is_preflight(&plain));
        assert_eq!(preflight_response(600).status(), StatusCode::NO_CONTENT);
    }
}
