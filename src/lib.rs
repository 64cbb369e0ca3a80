//! tokengate: short-lived access tokens, rotating refresh tokens, token
//! revocation and per-client rate limiting behind an Axum API.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod web;
