//! Client identification for rate limiting.
//!
//! By default the key is the socket peer address. With
//! `server.trust_forwarded_headers` the first `X-Forwarded-For` entry wins,
//! then `X-Real-IP`. Those headers are client-controlled unless a proxy
//! overwrites them, so trusting them directly lets a caller pick a fresh key
//! per request. Falls back to `"unknown"`.

use crate::web::api::AppState;
use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Extractor yielding the rate-limit key of the calling client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust = AppState::from_ref(state).trust_forwarded_headers;
        Ok(ClientIp(client_key(&parts.headers, &parts.extensions, trust)))
    }
}

pub fn client_key(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(forwarded) = forwarded_client(headers) {
            return forwarded;
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}
