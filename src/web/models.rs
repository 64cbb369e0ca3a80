//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

/// Represents a login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body of `POST /auth/refresh`. The token may instead arrive in the refresh cookie.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Represents a token validation response.
#[derive(Debug, Serialize)]
pub struct TokenCheckResponse {
    pub valid: bool,
    pub username: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub ok: bool,
    pub message: &'static str,
}

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    pub error: &'static str,
    pub message: &'static str,
    pub retry_after_seconds: u64,
}

/// Body of every other error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}
