//! Login, refresh and logout flows.
//!
//! `AuthService` composes the rate limiter, the credential backend, the
//! access-token issuer, the refresh-token store and the blacklist. Identity
//! travels as explicit arguments and return values; there is no ambient
//! "current user".
//!
//! Tracing events:
//! - `auth.login.success` / `auth.login.failed` / `auth.login.rate_limited`
//! - `auth.token.invalid` - access token rejected during request verification
//! - `auth.token.blacklisted` - access token revoked on logout

use crate::auth::backend::AuthBackend;
use crate::auth::blacklist::TokenBlacklist;
use crate::auth::issuer::{AccessClaims, TokenIssuer};
use crate::auth::mask_username;
use crate::auth::rate_limiter::RateLimiter;
use crate::auth::refresh_store::{RefreshToken, RefreshTokenStore};
use crate::error::{AuthError, Result};
use serde::Serialize;
use std::sync::Arc;

/// Tokens handed back after login or refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub token_type: &'static str,
}

pub struct AuthService {
    issuer: TokenIssuer,
    refresh_store: Arc<dyn RefreshTokenStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    rate_limiter: Arc<RateLimiter>,
    backend: Arc<dyn AuthBackend>,
}

impl AuthService {
    pub fn new(
        issuer: TokenIssuer,
        refresh_store: Arc<dyn RefreshTokenStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        rate_limiter: Arc<RateLimiter>,
        backend: Arc<dyn AuthBackend>,
    ) -> Self {
        Self {
            issuer,
            refresh_store,
            blacklist,
            rate_limiter,
            backend,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn refresh_store(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.refresh_store
    }

    pub fn blacklist(&self) -> &Arc<dyn TokenBlacklist> {
        &self.blacklist
    }

    /// Authenticate `username`/`password` on behalf of `client_key` (the
    /// client IP) and issue a token pair.
    pub async fn login(&self, client_key: &str, username: &str, password: &str) -> Result<TokenPair> {
        if !self.rate_limiter.is_allowed(client_key) {
            let retry_after_seconds = self.rate_limiter.seconds_until_unblocked(client_key);
            tracing::warn!(
                target: "auth.login.rate_limited",
                client = %client_key,
                retry_after_secs = retry_after_seconds,
                "Login rate limited"
            );
            return Err(AuthError::RateLimited { retry_after_seconds });
        }

        let Some(roles) = self.backend.authenticate(username, password).await else {
            self.rate_limiter.record_failed_login(client_key);
            tracing::warn!(
                target: "auth.login.failed",
                user = %mask_username(username),
                client = %client_key,
                "Failed login attempt"
            );
            return Err(AuthError::InvalidCredentials);
        };

        self.rate_limiter.reset_limit(client_key);
        let access_token = self.issuer.issue(username, &roles)?;
        let refresh = self.refresh_store.create_for_user(username).await?;

        tracing::info!(
            target: "auth.login.success",
            user = %mask_username(username),
            "User logged in"
        );
        Ok(self.pair(access_token, refresh))
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair> {
        let successor = self.refresh_store.rotate(presented).await?;

        let Some(roles) = self.backend.roles_for(&successor.username).await else {
            tracing::warn!(
                target: "auth.token.invalid",
                user = %mask_username(&successor.username),
                "Refresh for a user that no longer exists"
            );
            self.refresh_store.revoke_all_for_user(&successor.username).await?;
            return Err(AuthError::RefreshInvalid);
        };

        let access_token = self.issuer.issue(&successor.username, &roles)?;
        Ok(self.pair(access_token, successor))
    }

    /// Revoke the presented access token and every refresh token of `username`.
    ///
    /// A token whose signature cannot be checked is skipped: it would never
    /// pass verification anyway.
    pub async fn logout(&self, access_token: Option<&str>, username: Option<&str>) -> Result<()> {
        if let Some(token) = access_token {
            match self.issuer.expiry_of(token) {
                Ok(expires_at) => {
                    self.blacklist.add(token, expires_at).await?;
                    tracing::info!(target: "auth.token.blacklisted", "Access token blacklisted");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to blacklist access token");
                }
            }
        }

        if let Some(username) = username {
            self.refresh_store.revoke_all_for_user(username).await?;
            tracing::info!(user = %mask_username(username), "User logged out");
        }
        Ok(())
    }

    /// Check a bearer token against the blacklist, then its signature and expiry.
    pub async fn verify_request(&self, token: &str) -> Result<AccessClaims> {
        if self.blacklist.contains(token).await? {
            tracing::warn!(target: "auth.token.invalid", "Blacklisted token used");
            return Err(AuthError::TokenRevoked);
        }

        self.issuer.verify(token).inspect_err(|e| match e {
            AuthError::TokenExpired => {
                tracing::debug!(target: "auth.token.invalid", "Expired access token used");
            }
            e => {
                tracing::warn!(target: "auth.token.invalid", error = %e, "Invalid access token");
            }
        })
    }

    /// Resolve a bearer token to claims. Any failure means "unauthenticated".
    pub async fn authenticate_request(&self, token: &str) -> Option<AccessClaims> {
        match self.verify_request(token).await {
            Ok(claims) => Some(claims),
            Err(e) if e.is_token_error() => None,
            Err(e) => {
                tracing::error!(error = %e, "Blacklist lookup failed, rejecting token");
                None
            }
        }
    }

    fn pair(&self, access_token: String, refresh: RefreshToken) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token: refresh.token,
            expires_in: self.issuer.access_ttl().as_secs(),
            token_type: "Bearer",
        }
    }
}
