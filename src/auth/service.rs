//! Login, refresh and logout flows.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::error::{AuthError, StoreError};
use crate::auth::hasher::CredentialHasher;
use crate::auth::token::{Identity, TokenIssuer, TokenPair};
use crate::auth::users::{Role, UserRecord, UserStore};

/// User fields safe to return to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<&UserRecord> for PublicUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            role: record.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

/// Credential and token flows over an external user store.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: Arc<CredentialHasher>,
    issuer: Arc<TokenIssuer>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<CredentialHasher>,
        issuer: Arc<TokenIssuer>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            issuer,
            lookup_timeout,
        }
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Check credentials and issue a pair.
    ///
    /// Unknown email and wrong password are indistinguishable. Disabled and
    /// unverified accounts are only reported once the password is proven.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        let user = self.store.find_user_by_email(email).await?;

        let user = match user {
            Some(user) => user,
            None => {
                self.run_dummy_verification(password).await?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if !user.is_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let tokens = self
            .issuer
            .issue_pair(&Identity::new(user.id.clone(), user.role))?;
        tracing::info!(user_id = %user.id, "Login succeeded");

        Ok(LoginResult {
            user: PublicUser::from(&user),
            tokens,
        })
    }

    /// Exchange a refresh token for an entirely new pair.
    ///
    /// The subject must still exist and be active. A store failure or timeout
    /// counts as a failed verification.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .issuer
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let lookup = tokio::time::timeout(self.lookup_timeout, self.store.find_user_by_id(&claims.sub))
            .await
            .map_err(|_| StoreError::Timeout);

        let user = match lookup {
            Ok(Ok(user)) => user,
            Ok(Err(e)) | Err(e) => {
                tracing::warn!(user_id = %claims.sub, error = %e, "User lookup failed during refresh");
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        match user {
            Some(user) if user.is_active => {
                // Role comes from the store, not the old token
                self.issuer.issue_pair(&Identity::new(user.id, user.role))
            }
            _ => Err(AuthError::UserNotFound),
        }
    }

    /// Best-effort logout. Tokens are stateless, so nothing can fail here.
    pub fn logout(&self, refresh_token: Option<&str>) {
        match refresh_token.map(|t| self.issuer.verify_refresh(t)) {
            Some(Ok(claims)) => tracing::info!(user_id = %claims.sub, "Logout"),
            Some(Err(e)) => tracing::debug!(error = %e, "Logout with unusable refresh token"),
            None => tracing::debug!("Logout without refresh token"),
        }
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    async fn run_dummy_verification(&self, password: &str) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}
