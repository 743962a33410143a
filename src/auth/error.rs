//! Authentication errors and their client-facing mapping.

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::{ErrorCode, Rejection};

/// Failure of the external user-record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),

    #[error("user store lookup timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account disabled")]
    AccountDisabled,

    #[error("email not verified")]
    EmailNotVerified,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("user not found or inactive")]
    UserNotFound,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Client-facing rejection. Infrastructure failures collapse into one
    /// generic 500 so hashing, signing and store problems look identical.
    pub fn to_rejection(&self) -> Rejection {
        match self {
            AuthError::InvalidCredentials => Rejection::unauthorized(
                ErrorCode::InvalidCredentials,
                "Invalid email or password",
            ),
            AuthError::AccountDisabled => {
                Rejection::unauthorized(ErrorCode::AccountDisabled, "Account is disabled")
            }
            AuthError::EmailNotVerified => {
                Rejection::unauthorized(ErrorCode::EmailNotVerified, "Email address is not verified")
            }
            AuthError::InvalidToken => {
                Rejection::unauthorized(ErrorCode::InvalidToken, "Invalid authentication token")
            }
            AuthError::TokenExpired => {
                Rejection::unauthorized(ErrorCode::TokenExpired, "Authentication token has expired")
            }
            AuthError::InvalidRefreshToken => Rejection::unauthorized(
                ErrorCode::InvalidRefreshToken,
                "Invalid or expired refresh token",
            ),
            AuthError::UserNotFound => {
                Rejection::unauthorized(ErrorCode::UserNotFound, "User not found or inactive")
            }
            AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Store(_) => {
                Rejection::internal()
            }
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Store(_)
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_infrastructure() {
            tracing::error!(error = %self, "Authentication infrastructure failure");
        }
        self.to_rejection().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_infrastructure_errors_are_generic() {
        let hashing = AuthError::Hashing("argon2 blew up".into()).to_rejection();
        let store = AuthError::Store(StoreError::Timeout).to_rejection();
        assert_eq!(hashing, store);
        assert_eq!(hashing.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!hashing.message.contains("argon2"));
    }

    #[test]
    fn test_identity_failures_are_401() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountDisabled,
            AuthError::EmailNotVerified,
            AuthError::InvalidRefreshToken,
            AuthError::UserNotFound,
        ] {
            assert_eq!(err.to_rejection().status, StatusCode::UNAUTHORIZED);
        }
    }
}
