use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::service::AuthService;
use crate::auth::token::Claims;
use crate::auth::users::Role;
use crate::http::response::{ApiSuccess, ErrorCode, Rejection};

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub role: Role,
    pub expires_at: i64,
}

fn validation_error(message: &str) -> Response {
    Rejection::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message).into_response()
}

/// Body is read as raw bytes so missing fields get our own 400 instead of
/// the extractor's 422.
fn parse<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Option<T> {
    serde_json::from_slice(body).ok()
}

pub async fn login(State(service): State<Arc<AuthService>>, body: Bytes) -> Response {
    let request: LoginRequest = match parse(&body) {
        Some(r) => r,
        None => return validation_error("Email and password are required"),
    };
    let (email, password) = match (request.email, request.password) {
        (Some(e), Some(p)) if !e.trim().is_empty() && !p.is_empty() => (e, p),
        _ => return validation_error("Email and password are required"),
    };

    match service.login(&email, &password).await {
        Ok(result) => ApiSuccess::new(result).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn refresh(State(service): State<Arc<AuthService>>, body: Bytes) -> Response {
    let token = parse::<RefreshRequest>(&body).and_then(|r| r.refresh_token);
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return validation_error("Refresh token is required"),
    };

    match service.refresh(&token).await {
        Ok(tokens) => ApiSuccess::new(serde_json::json!({ "tokens": tokens })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Always succeeds.
pub async fn logout(State(service): State<Arc<AuthService>>, body: Bytes) -> Response {
    let token = parse::<RefreshRequest>(&body).and_then(|r| r.refresh_token);
    service.logout(token.as_deref());
    Json(serde_json::json!({ "success": true, "message": "Logged out" })).into_response()
}

/// Echo the verified identity. Mounted behind `require_auth`.
pub async fn session(Extension(claims): Extension<Claims>) -> Json<ApiSuccess<SessionInfo>> {
    ApiSuccess::new(SessionInfo {
        user_id: claims.sub,
        role: claims.role,
        expires_at: claims.exp,
    })
}
