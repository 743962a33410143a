//! Bearer-token authentication for route groups.
//! Attaches verified `Claims` to the request for downstream handlers.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::auth::token::{Claims, TokenIssuer};
use crate::auth::users::Role;
use crate::http::response::{ErrorCode, Rejection};

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_auth(
    State(issuer): State<Arc<TokenIssuer>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(&req) {
        Some(t) => t,
        None => {
            return Rejection::unauthorized(ErrorCode::NoToken, "Authentication required")
                .into_response();
        }
    };

    match issuer.verify_access(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Must run inside `require_auth`.
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    let subject = req
        .extensions()
        .get::<Claims>()
        .map(|c| (c.sub.clone(), c.role));

    match subject {
        Some((_, Role::Admin)) => next.run(req).await,
        Some((user_id, _)) => {
            tracing::warn!(user_id = %user_id, path = %req.uri().path(), "Non-admin on admin route");
            Rejection::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, "Admin access required")
                .into_response()
        }
        None => Rejection::unauthorized(ErrorCode::NoToken, "Authentication required")
            .into_response(),
    }
}
