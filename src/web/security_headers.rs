//! Response hardening applied to every route.
//!
//! Auth responses carry tokens, so nothing may be cached. The remaining
//! headers lock the JSON API out of framing, sniffing and inline content.
//! HSTS is opt-in because it only makes sense behind TLS.

use axum::Router;
use axum::http::{HeaderName, HeaderValue, header};
use tower_http::set_header::SetResponseHeaderLayer;

const FIXED_HEADERS: [(HeaderName, &str); 6] = [
    (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
    (header::PRAGMA, "no-cache"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'"),
];

/// `Strict-Transport-Security` value for `max_age_seconds`, or `None` when disabled.
pub fn hsts_value(max_age_seconds: u64) -> Option<HeaderValue> {
    if max_age_seconds == 0 {
        return None;
    }
    HeaderValue::try_from(format!("max-age={max_age_seconds}; includeSubDomains")).ok()
}

/// Wrap `router` so every response, errors included, carries the hardening headers.
pub fn apply(router: Router, hsts_max_age_seconds: u64) -> Router {
    let router = FIXED_HEADERS.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value)))
    });
    router.layer(SetResponseHeaderLayer::overriding(
        header::STRICT_TRANSPORT_SECURITY,
        hsts_value(hsts_max_age_seconds),
    ))
}
