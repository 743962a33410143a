//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! POST /api/auth/login
//!     → service.rs (user lookup → hasher.rs verify → account checks)
//!     → token.rs (issue access + refresh pair)
//!
//! POST /api/auth/refresh
//!     → token.rs (verify refresh) → users.rs (subject still active?)
//!     → token.rs (issue new pair)
//!
//! Authenticated routes:
//!     → middleware.rs (Bearer → verify access → Claims extension)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Tokens are stateless; there is no revocation list
//! - The user store is an external collaborator behind `UserStore`
//! - Hashing runs on the blocking pool so Argon2 never stalls the runtime

pub mod error;
pub mod handlers;
pub mod hasher;
pub mod middleware;
pub mod service;
pub mod token;
pub mod users;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use error::{AuthError, StoreError};
pub use hasher::CredentialHasher;
pub use service::{AuthService, LoginResult, PublicUser};
pub use token::{Claims, Identity, TokenIssuer, TokenKind, TokenPair};
pub use users::{InMemoryUserStore, Role, UserRecord, UserStore};

/// Login, refresh, logout and identity echo.
pub fn auth_routes(service: Arc<AuthService>) -> Router {
    let issuer = service.issuer().clone();
    let me = Router::new()
        .route("/api/auth/me", get(handlers::session))
        .layer(from_fn_with_state(issuer, middleware::require_auth));

    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/logout", post(handlers::logout))
        .with_state(service)
        .merge(me)
}
