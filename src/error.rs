// src/error.rs - Error taxonomy for the token and abuse-control core
use thiserror::Error;

/// Errors produced by the issuer, the token stores, the rate limiter and the
/// login/refresh/logout flows.
///
/// Every refresh-token failure collapses into [`AuthError::RefreshInvalid`] so
/// a caller cannot tell an unknown token from an expired or already rotated one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    TokenMalformed,
    #[error("token signature is invalid")]
    TokenSignatureInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("refresh token is invalid, expired, or already used")]
    RefreshInvalid,
    #[error("too many requests, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for the access-token verification failures, which callers treat
    /// as "unauthenticated" rather than as a hard error.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::TokenMalformed
                | AuthError::TokenSignatureInvalid
                | AuthError::TokenExpired
                | AuthError::TokenRevoked
        )
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
