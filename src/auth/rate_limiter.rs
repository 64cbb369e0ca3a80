// src/auth/rate_limiter.rs
//! In-memory, thread-safe rate limiter for authentication endpoints.
//! Counts requests per key (client IP) in a fixed window and blocks the key
//! for a configurable period once the window's budget is exceeded.
//!
//! Each key's read-modify-write runs under its `DashMap` entry guard, so
//! concurrent requests for one key never lose updates.
//!
//! The map is bounded. When it is full and idle keys cannot be reclaimed, a
//! new key fails closed: it is treated as blocked until room frees up.
//!
//! State is per process. Several server instances each keep their own counts.

use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateLimitState {
    window_start: DateTime<Utc>,
    count: u32,
    blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 1,
            blocked_until: None,
        }
    }

    fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Rate-limit policy.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub block: Duration,
    pub failed_login_penalty: u32,
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            window: seconds(config.window_seconds),
            max_requests: config.max_requests,
            block: seconds(config.block_seconds),
            failed_login_penalty: config.failed_login_penalty,
        }
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

pub struct RateLimiter {
    entries: DashMap<String, RateLimitState>,
    max_tracked_keys: usize,
    policy: RateLimitPolicy,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, max_tracked_keys: usize, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            max_tracked_keys: max_tracked_keys.max(1),
            policy,
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: SharedClock) -> Self {
        Self::new(RateLimitPolicy::from(config), config.max_tracked_keys, clock)
    }

    fn at_capacity(&self, key: &str) -> bool {
        !self.entries.contains_key(key) && self.entries.len() >= self.max_tracked_keys
    }

    /// Returns true if a request for `key` is allowed, false if rate limited.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = self.clock.now();

        if self.at_capacity(key) {
            self.cleanup();
            if self.at_capacity(key) {
                tracing::error!(
                    key = %key,
                    tracked = self.entries.len(),
                    "Rate limiter full, rejecting new key"
                );
                return false;
            }
        }

        let mut state = match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitState::fresh(now));
                return true;
            }
            Entry::Occupied(occupied) => occupied.into_ref(),
        };

        if state.is_blocked(now) {
            tracing::debug!(key = %key, "Rate limit: key is blocked");
            return false;
        }
        // An elapsed block or window starts over.
        if state.blocked_until.is_some() || now - state.window_start > self.policy.window {
            *state = RateLimitState::fresh(now);
            return true;
        }

        state.count = state.count.saturating_add(1);
        if state.count > self.policy.max_requests {
            state.blocked_until = Some(
                now.checked_add_signed(self.policy.block)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            tracing::warn!(
                key = %key,
                count = state.count,
                block_seconds = self.policy.block.num_seconds(),
                "Rate limit exceeded, key blocked"
            );
            return false;
        }
        true
    }

    /// Charge a failed login against the current window for `key`.
    /// Does nothing if the key has no window yet.
    pub fn record_failed_login(&self, key: &str) {
        if let Some(mut state) = self.entries.get_mut(key) {
            state.count = state.count.saturating_add(self.policy.failed_login_penalty);
        }
    }

    /// Forget all counting and block state for `key`.
    pub fn reset_limit(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(state) => state.is_blocked(now),
            None => self.at_capacity(key),
        }
    }

    /// Whole seconds until `key` is unblocked, rounded up; 0 if not blocked.
    pub fn seconds_until_unblocked(&self, key: &str) -> u64 {
        let now = self.clock.now();
        let until = match self.entries.get(key) {
            Some(state) => state.blocked_until,
            None if self.at_capacity(key) => {
                return self.policy.block.num_seconds().max(1) as u64;
            }
            None => None,
        };
        match until {
            Some(until) if now < until => {
                let millis = (until - now).num_milliseconds();
                (millis.saturating_add(999) / 1000).max(1) as u64
            }
            _ => 0,
        }
    }

    /// Drop entries whose window has elapsed and that are not blocked.
    /// Returns how many keys were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, s| {
            let keep = s.is_blocked(now) || now - s.window_start <= self.policy.window;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}
