//! Token lifecycle and abuse control: access-token issuance, refresh-token
//! rotation, blacklisting, rate limiting and the flows that combine them.

pub mod backend;
pub mod blacklist;
pub mod cleanup;
pub mod issuer;
pub mod rate_limiter;
pub mod refresh_store;
pub mod service;

pub use backend::{AuthBackend, InMemoryAuthBackend};
pub use blacklist::{BlacklistEntry, InMemoryTokenBlacklist, TokenBlacklist};
pub use cleanup::{Cleanup, CleanupReport, spawn_cleanup_task};
pub use issuer::{AccessClaims, TokenIssuer};
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
pub use refresh_store::{InMemoryRefreshTokenStore, RefreshToken, RefreshTokenStore};
pub use service::{AuthService, TokenPair};

/// Mask a username for logs: first two characters, then `***`.
pub(crate) fn mask_username(username: &str) -> String {
    if username.chars().count() <= 2 {
        return "***".to_string();
    }
    let prefix: String = username.chars().take(2).collect();
    format!("{}***", prefix)
}
