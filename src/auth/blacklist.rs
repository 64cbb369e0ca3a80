//! Revoked access tokens, kept until their natural expiry.
//!
//! An expired access token already fails signature-and-expiry verification,
//! so an entry is prunable as soon as its `expires_at` has passed.

use crate::clock::SharedClock;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub token: String,
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Record `token` as revoked. Re-adding an existing token is a no-op.
    async fn add(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()>;

    async fn contains(&self, token: &str) -> Result<bool>;

    /// Delete entries whose `expires_at` is before `now`. Returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// In-memory blacklist keyed by the full token string.
pub struct InMemoryTokenBlacklist {
    entries: RwLock<HashMap<String, BlacklistEntry>>,
    clock: SharedClock,
}

impl InMemoryTokenBlacklist {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn entry(&self, token: &str) -> Option<BlacklistEntry> {
        self.entries.read().await.get(token).cloned()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryTokenBlacklist {
    async fn add(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        self.entries
            .write()
            .await
            .entry(token.to_string())
            .or_insert_with(|| BlacklistEntry {
                token: token.to_string(),
                blacklisted_at: now,
                expires_at,
            });
        Ok(())
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(token))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at >= now);
        Ok(before - entries.len())
    }
}
