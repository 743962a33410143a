//! Access/refresh token pairs.
//!
//! # Responsibilities
//! - Sign time-bounded identity claims (HS256)
//! - Verify access and refresh tokens against their own keys
//! - Rotate signing keys without restarting
//!
//! # Design Decisions
//! - Access and refresh tokens use different secrets and a `typ` claim, so one
//!   can never stand in for the other
//! - Every issue mints a fresh pair with a new `jti`; tokens are never extended
//! - No leeway: a token is dead the second after `exp`
//! - Rotation has no grace period; tokens signed with a previous key fail

use arc_swap::ArcSwap;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::users::Role;
use crate::config::AuthConfig;

/// Which half of a pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed identity claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub role: Role,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expires at (seconds since epoch).
    pub exp: i64,
    pub iss: String,
    pub typ: TokenKind,
    pub jti: String,
}

/// The identity a pair is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

struct SigningKeys {
    access: KeyPair,
    refresh: KeyPair,
}

/// Issues and verifies token pairs.
pub struct TokenIssuer {
    keys: ArcSwap<SigningKeys>,
    issuer: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            keys: ArcSwap::from_pointee(SigningKeys {
                access: KeyPair::from_secret(&config.access_secret),
                refresh: KeyPair::from_secret(&config.refresh_secret),
            }),
            issuer: config.issuer.clone(),
            access_ttl_secs: i64::try_from(config.access_ttl_secs).unwrap_or(i64::MAX),
            refresh_ttl_secs: i64::try_from(config.refresh_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Replace both signing secrets. Outstanding tokens stop verifying.
    pub fn rotate_keys(&self, access_secret: &str, refresh_secret: &str) {
        self.keys.store(Arc::new(SigningKeys {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
        }));
        tracing::warn!("Token signing keys rotated; outstanding tokens are now invalid");
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        self.issue_pair_at(identity, Utc::now().timestamp())
    }

    /// Issue a pair as if the current time were `now`.
    pub fn issue_pair_at(&self, identity: &Identity, now: i64) -> Result<TokenPair, AuthError> {
        let keys = self.keys.load();
        let access = self.sign(identity, TokenKind::Access, now, &keys.access.encoding)?;
        let refresh = self.sign(identity, TokenKind::Refresh, now, &keys.refresh.encoding)?;
        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
        })
    }

    fn sign(
        &self,
        identity: &Identity,
        kind: TokenKind,
        now: i64,
        key: &EncodingKey,
    ) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: identity.user_id.clone(),
            role: identity.role,
            iat: now,
            exp: now.saturating_add(ttl),
            iss: self.issuer.clone(),
            typ: kind,
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        let keys = self.keys.load();
        self.verify(token, TokenKind::Access, &keys.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let keys = self.keys.load();
        self.verify(token, TokenKind::Refresh, &keys.refresh.decoding)
    }

    fn verify(&self, token: &str, kind: TokenKind, key: &DecodingKey) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        let data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        if data.claims.typ != kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}
