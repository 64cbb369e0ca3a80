//! # Service Configuration
//!
//! Token lifetimes, refresh-cookie scope, rate-limit policy and cleanup cadence.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//! log_level = "info"
//! trust_forwarded_headers = false
//! hsts_max_age_seconds = 0
//!
//! [jwt]
//! secret = "change-me-to-at-least-32-bytes-of-entropy"
//! access_ttl_minutes = 15
//!
//! [refresh]
//! ttl_days = 7
//!
//! [rate_limit]
//! window_seconds = 60
//! max_requests = 100
//! block_seconds = 60
//! failed_login_penalty = 2
//!
//! [cleanup]
//! interval_seconds = 3600
//! ```
//!
//! Every field is optional; missing values fall back to the defaults below.
//! The signing secret can also come from `TOKENGATE_JWT_SECRET`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `jwt.secret`.
pub const JWT_SECRET_ENV: &str = "TOKENGATE_JWT_SECRET";

const MIN_SECRET_LEN: usize = 32;
const MAX_ACCESS_TTL_MINUTES: u64 = 24 * 60;
const MAX_REFRESH_TTL_DAYS: u64 = 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// enable behind a proxy that overwrites these headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
    /// `Strict-Transport-Security` max-age; 0 leaves the header off.
    #[serde(default)]
    pub hsts_max_age_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            trust_forwarded_headers: false,
            hsts_max_age_seconds: 0,
        }
    }
}

/// Access-token signing.
#[derive(Clone, Deserialize, Serialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_minutes: default_access_ttl_minutes(),
        }
    }
}

// Keeps the secret out of debug logs.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .finish()
    }
}

impl JwtConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_minutes.saturating_mul(60))
    }
}

/// Refresh-token lifetime and cookie scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_ttl_days")]
    pub ttl_days: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_refresh_ttl_days(),
            cookie_name: default_cookie_name(),
            cookie_path: default_cookie_path(),
        }
    }
}

impl RefreshConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }
}

/// Per-IP request limiting for the authentication endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_block_seconds")]
    pub block_seconds: u64,
    /// Extra counts charged for each failed login on top of the request itself.
    #[serde(default = "default_failed_login_penalty")]
    pub failed_login_penalty: u32,
    /// Upper bound on tracked client keys. New keys are rejected while full.
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            max_requests: default_max_requests(),
            block_seconds: default_block_seconds(),
            failed_login_penalty: default_failed_login_penalty(),
            max_tracked_keys: default_max_tracked_keys(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Config {
    /// Replace the signing secret with `TOKENGATE_JWT_SECRET` when it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.jwt.secret = secret;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "jwt.secret must be at least {} bytes (set it in the config file or {})",
                MIN_SECRET_LEN, JWT_SECRET_ENV
            )));
        }
        if self.jwt.access_ttl_minutes == 0 || self.jwt.access_ttl_minutes > MAX_ACCESS_TTL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "jwt.access_ttl_minutes must be between 1 and {}",
                MAX_ACCESS_TTL_MINUTES
            )));
        }
        if self.refresh.ttl_days == 0 || self.refresh.ttl_days > MAX_REFRESH_TTL_DAYS {
            return Err(ConfigError::Invalid(format!(
                "refresh.ttl_days must be between 1 and {}",
                MAX_REFRESH_TTL_DAYS
            )));
        }
        let rl = &self.rate_limit;
        if rl.window_seconds == 0 || rl.block_seconds == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.window_seconds and rate_limit.block_seconds must be > 0".to_string(),
            ));
        }
        if rl.max_requests == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_requests must be > 0".to_string()));
        }
        if rl.max_tracked_keys == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_tracked_keys must be > 0".to_string()));
        }
        if self.cleanup.interval_seconds == 0 {
            return Err(ConfigError::Invalid("cleanup.interval_seconds must be > 0".to_string()));
        }
        Ok(())
    }
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_access_ttl_minutes() -> u64 { 15 }
fn default_refresh_ttl_days() -> u64 { 7 }
fn default_cookie_name() -> String { "refreshToken".to_string() }
fn default_cookie_path() -> String { "/auth".to_string() }
fn default_window_seconds() -> u64 { 60 }
fn default_max_requests() -> u32 { 100 }
fn default_block_seconds() -> u64 { 60 }
fn default_failed_login_penalty() -> u32 { 2 }
fn default_max_tracked_keys() -> usize { 100_000 }
fn default_cleanup_interval_seconds() -> u64 { 3600 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
