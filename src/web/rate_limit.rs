use crate::error::AuthError;
use crate::web::api::AppState;
use crate::web::client_ip::client_key;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Middleware charging each request against the caller's rate-limit key.
///
/// Applied to the auth routes other than login, which consults the limiter
/// itself so that it can also charge failed credential checks.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(req.headers(), req.extensions(), state.trust_forwarded_headers);
    let limiter = state.auth.rate_limiter();

    if !limiter.is_allowed(&key) {
        let retry_after_seconds = limiter.seconds_until_unblocked(&key);
        tracing::warn!(
            client = %key,
            path = %req.uri().path(),
            retry_after_secs = retry_after_seconds,
            "Rate limit exceeded"
        );
        return AuthError::RateLimited { retry_after_seconds }.into_response();
    }
    next.run(req).await
}
