//! Refresh-token persistence and single-use rotation.
//!
//! This module emits tracing events for security monitoring:
//! - `auth.token.refresh` - Token rotated
//! - `auth.token.invalid` - Unknown, revoked, or expired token presented
//! - `auth.token.revoke_all` - All tokens revoked for a user

use crate::auth::mask_username;
use crate::clock::SharedClock;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;

/// Length of the opaque token string; 64 alphanumerics is ~380 bits.
const TOKEN_LEN: usize = 64;

/// A persisted refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage for refresh tokens.
///
/// Implementations own every write to refresh-token state. `rotate` must be
/// atomic: when several callers present the same live token concurrently,
/// exactly one of them receives a successor and the rest get
/// [`AuthError::RefreshInvalid`].
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Revoke every live token for `username` and persist a fresh one.
    async fn create_for_user(&self, username: &str) -> Result<RefreshToken>;

    /// Consume `presented` and return its sole successor.
    async fn rotate(&self, presented: &str) -> Result<RefreshToken>;

    /// Return the token if it is live, without consuming it.
    async fn validate(&self, presented: &str) -> Result<Option<RefreshToken>>;

    /// Mark every token for `username` revoked. Idempotent.
    async fn revoke_all_for_user(&self, username: &str) -> Result<()>;

    /// Delete tokens whose `expires_at` is before `now`. Returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Default)]
struct Tokens {
    by_token: HashMap<String, RefreshToken>,
    by_user: HashMap<String, HashSet<String>>,
}

impl Tokens {
    fn revoke_all(&mut self, username: &str) -> usize {
        let Some(owned) = self.by_user.get(username) else {
            return 0;
        };
        let mut revoked = 0;
        for token in owned {
            if let Some(entry) = self.by_token.get_mut(token) {
                if !entry.revoked {
                    entry.revoked = true;
                    revoked += 1;
                }
            }
        }
        revoked
    }

    fn insert(&mut self, token: RefreshToken) {
        self.by_user
            .entry(token.username.clone())
            .or_default()
            .insert(token.token.clone());
        self.by_token.insert(token.token.clone(), token);
    }
}

/// In-memory refresh-token store.
///
/// A single write guard covers lookup, revocation and successor creation, so
/// the `revoked` flag flips from false to true exactly once per token.
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<Tokens>,
    ttl: chrono::Duration,
    clock: SharedClock,
}

impl InMemoryRefreshTokenStore {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            tokens: RwLock::new(Tokens::default()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.by_token.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn mint(&self, username: &str, now: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            token: Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN),
            username: username.to_string(),
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            revoked: false,
        }
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create_for_user(&self, username: &str) -> Result<RefreshToken> {
        let now = self.clock.now();
        let mut tokens = self.tokens.write().await;
        let revoked = tokens.revoke_all(username);
        let token = self.mint(username, now);
        tokens.insert(token.clone());

        tracing::info!(
            user = %mask_username(username),
            revoked_previous = revoked,
            "Refresh token created"
        );
        Ok(token)
    }

    async fn rotate(&self, presented: &str) -> Result<RefreshToken> {
        let now = self.clock.now();
        let mut tokens = self.tokens.write().await;

        let username = match tokens.by_token.get_mut(presented) {
            Some(entry) if !entry.revoked => {
                // Consumed either way: an expired token is retired on sight.
                entry.revoked = true;
                if entry.is_expired(now) {
                    tracing::warn!(
                        target: "auth.token.invalid",
                        user = %mask_username(&entry.username),
                        "Expired refresh token presented"
                    );
                    return Err(AuthError::RefreshInvalid);
                }
                entry.username.clone()
            }
            _ => {
                tracing::warn!(
                    target: "auth.token.invalid",
                    "Refresh token not found or already revoked"
                );
                return Err(AuthError::RefreshInvalid);
            }
        };

        tokens.revoke_all(&username);
        let successor = self.mint(&username, now);
        tokens.insert(successor.clone());

        tracing::info!(
            target: "auth.token.refresh",
            user = %mask_username(&username),
            "Refresh token rotated"
        );
        Ok(successor)
    }

    async fn validate(&self, presented: &str) -> Result<Option<RefreshToken>> {
        let now = self.clock.now();
        let tokens = self.tokens.read().await;
        Ok(tokens
            .by_token
            .get(presented)
            .filter(|t| !t.revoked && !t.is_expired(now))
            .cloned())
    }

    async fn revoke_all_for_user(&self, username: &str) -> Result<()> {
        let revoked = self.tokens.write().await.revoke_all(username);
        tracing::info!(
            target: "auth.token.revoke_all",
            user = %mask_username(username),
            revoked,
            "All refresh tokens revoked for user"
        );
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut guard = self.tokens.write().await;
        let tokens = &mut *guard;
        let before = tokens.by_token.len();
        tokens.by_token.retain(|_, t| t.expires_at >= now);
        let by_token = &tokens.by_token;
        tokens.by_user.retain(|_, owned| {
            owned.retain(|t| by_token.contains_key(t));
            !owned.is_empty()
        });
        Ok(before - tokens.by_token.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn store() -> (Arc<InMemoryRefreshTokenStore>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = InMemoryRefreshTokenStore::new(WEEK, Arc::new(clock.clone()));
        (Arc::new(store), clock)
    }

    #[tokio::test]
    async fn test_create_for_user() {
        let (store, clock) = store();
        let token = store.create_for_user("alice").await.unwrap();

        assert_eq!(token.username, "alice");
        assert_eq!(token.token.len(), TOKEN_LEN);
        assert!(!token.revoked);
        assert_eq!(token.expires_at, clock.now() + chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn test_second_create_revokes_first() {
        let (store, _clock) = store();
        let first = store.create_for_user("alice").await.unwrap();
        let second = store.create_for_user("alice").await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(store.validate(&first.token).await.unwrap().is_none());
        assert!(store.validate(&second.token).await.unwrap().is_some());
        assert_eq!(store.rotate(&first.token).await, Err(AuthError::RefreshInvalid));
    }

    #[tokio::test]
    async fn test_create_does_not_touch_other_users() {
        let (store, _clock) = store();
        let alice = store.create_for_user("alice").await.unwrap();
        store.create_for_user("bob").await.unwrap();
        assert!(store.validate(&alice.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rotate_consumes_token() {
        let (store, _clock) = store();
        let initial = store.create_for_user("alice").await.unwrap();

        let next = store.rotate(&initial.token).await.unwrap();
        assert_eq!(next.username, "alice");
        assert_ne!(next.token, initial.token);

        // Replaying the consumed token fails, the successor still works.
        assert_eq!(store.rotate(&initial.token).await, Err(AuthError::RefreshInvalid));
        let third = store.rotate(&next.token).await.unwrap();
        assert_ne!(third.token, next.token);
    }

    #[tokio::test]
    async fn test_rotate_unknown_token() {
        let (store, _clock) = store();
        assert_eq!(store.rotate("not-a-token").await, Err(AuthError::RefreshInvalid));
    }

    #[tokio::test]
    async fn test_rotate_expired_token_revokes_it() {
        let (store, clock) = store();
        let token = store.create_for_user("alice").await.unwrap();

        clock.advance(chrono::Duration::days(7));
        assert_eq!(store.rotate(&token.token).await, Err(AuthError::RefreshInvalid));

        // Rewinding the clock does not bring it back.
        clock.advance(chrono::Duration::days(-1));
        assert_eq!(store.rotate(&token.token).await, Err(AuthError::RefreshInvalid));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotate_has_single_winner() {
        let (store, _clock) = store();
        let token = store.create_for_user("alice").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let presented = token.token.clone();
            handles.push(tokio::spawn(async move { store.rotate(&presented).await }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(successor) => winners.push(successor),
                Err(e) => assert_eq!(e, AuthError::RefreshInvalid),
            }
        }
        assert_eq!(winners.len(), 1);
        assert!(store.validate(&winners[0].token).await.unwrap().is_some());
        // Original plus exactly one successor.
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_is_idempotent() {
        let (store, _clock) = store();
        let token = store.create_for_user("alice").await.unwrap();

        store.revoke_all_for_user("alice").await.unwrap();
        store.revoke_all_for_user("alice").await.unwrap();
        store.revoke_all_for_user("nobody").await.unwrap();
        assert_eq!(store.rotate(&token.token).await, Err(AuthError::RefreshInvalid));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (store, clock) = store();
        let old = store.create_for_user("alice").await.unwrap();
        clock.advance(chrono::Duration::days(3));
        let fresh = store.create_for_user("bob").await.unwrap();

        let removed = store.cleanup_expired(old.expires_at + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.validate(&fresh.token).await.unwrap().is_some());

        // A user with no tokens left can still log in again.
        let again = store.create_for_user("alice").await.unwrap();
        assert!(store.validate(&again.token).await.unwrap().is_some());
    }
}
