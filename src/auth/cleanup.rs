//! Periodic pruning of expired refresh tokens, blacklist entries and idle
//! rate-limit keys.

use crate::auth::blacklist::TokenBlacklist;
use crate::auth::rate_limiter::RateLimiter;
use crate::auth::refresh_store::RefreshTokenStore;
use crate::clock::SharedClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Counts removed by one cleanup pass. `None` means that store's cleanup failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub refresh_tokens: Option<usize>,
    pub blacklist_entries: Option<usize>,
    pub rate_limit_keys: usize,
}

pub struct Cleanup {
    refresh_store: Arc<dyn RefreshTokenStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    rate_limiter: Arc<RateLimiter>,
    clock: SharedClock,
}

impl Cleanup {
    pub fn new(
        refresh_store: Arc<dyn RefreshTokenStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        rate_limiter: Arc<RateLimiter>,
        clock: SharedClock,
    ) -> Self {
        Self {
            refresh_store,
            blacklist,
            rate_limiter,
            clock,
        }
    }

    /// Run one pass. Failures are logged and left for the next pass.
    pub async fn run_once(&self) -> CleanupReport {
        let now = self.clock.now();

        let refresh_tokens = match self.refresh_store.cleanup_expired(now).await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(target: "auth.cleanup", error = %e, "Refresh token cleanup failed");
                None
            }
        };
        let blacklist_entries = match self.blacklist.cleanup_expired(now).await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(target: "auth.cleanup", error = %e, "Blacklist cleanup failed");
                None
            }
        };
        let rate_limit_keys = self.rate_limiter.cleanup();

        tracing::debug!(
            target: "auth.cleanup",
            refresh_tokens = ?refresh_tokens,
            blacklist_entries = ?blacklist_entries,
            rate_limit_keys,
            "Expired tokens cleaned up"
        );
        CleanupReport {
            refresh_tokens,
            blacklist_entries,
            rate_limit_keys,
        }
    }

    /// Spawn a task that runs a pass every `interval`, starting one interval from now.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        // interval_at panics on a zero period
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}

/// Start periodic cleanup of both token stores and the rate limiter.
pub fn spawn_cleanup_task(
    refresh_store: Arc<dyn RefreshTokenStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    rate_limiter: Arc<RateLimiter>,
    clock: SharedClock,
    interval: Duration,
) -> JoinHandle<()> {
    tracing::info!(target: "auth.cleanup", interval_secs = interval.as_secs(), "Token cleanup task started");
    Cleanup::new(refresh_store, blacklist, rate_limiter, clock).spawn(interval)
}
