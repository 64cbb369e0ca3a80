//! Defines the Axum API routes and handlers.

use crate::auth::{
    AuthBackend, AuthService, InMemoryRefreshTokenStore, InMemoryTokenBlacklist, RateLimiter,
    TokenIssuer, TokenPair,
};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::AuthError;
use crate::web::client_ip::ClientIp;
use crate::web::cookie::RefreshCookie;
use crate::web::models::{
    ErrorResponse, LoginRequest, LogoutResponse, RateLimitResponse, RefreshRequest,
    TokenCheckResponse,
};
use crate::web::rate_limit::rate_limit_middleware;
use crate::web::security_headers;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::{TypedHeader, TypedHeaderRejection};
use std::sync::Arc;

pub struct AppStateInner {
    pub auth: AuthService,
    pub refresh_cookie: RefreshCookie,
    /// Key the rate limiter on forwarding headers instead of the peer address.
    pub trust_forwarded_headers: bool,
    /// `Strict-Transport-Security` max-age; 0 leaves the header off.
    pub hsts_max_age_seconds: u64,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the in-memory stores, the issuer and the limiter from configuration.
    pub fn from_config(config: &Config, backend: Arc<dyn AuthBackend>, clock: SharedClock) -> AppState {
        let issuer = TokenIssuer::new(config.jwt.secret.as_bytes(), config.jwt.access_ttl(), clock.clone());
        let auth = AuthService::new(
            issuer,
            Arc::new(InMemoryRefreshTokenStore::new(config.refresh.ttl(), clock.clone())),
            Arc::new(InMemoryTokenBlacklist::new(clock.clone())),
            Arc::new(RateLimiter::from_config(&config.rate_limit, clock)),
            backend,
        );
        Arc::new(AppStateInner {
            auth,
            refresh_cookie: RefreshCookie::from_config(&config.refresh),
            trust_forwarded_headers: config.server.trust_forwarded_headers,
            hsts_max_age_seconds: config.server.hsts_max_age_seconds,
        })
    }
}

/// Helper to create a JSON error response with a code, message and status.
fn json_error(error: &'static str, message: impl Into<String>, status: StatusCode) -> Response {
    (status, Json(ErrorResponse { error, message: message.into() })).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::RateLimited { retry_after_seconds } => {
                let body = RateLimitResponse {
                    error: "rate_limit_exceeded",
                    message: "Too many requests. Please try again later.",
                    retry_after_seconds,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                response
            }
            AuthError::InvalidCredentials => json_error(
                "invalid_credentials",
                "Invalid username or password",
                StatusCode::UNAUTHORIZED,
            ),
            AuthError::RefreshInvalid => json_error(
                "invalid_refresh_token",
                "Refresh token is invalid, expired, or already used",
                StatusCode::UNAUTHORIZED,
            ),
            e if e.is_token_error() => {
                json_error("invalid_token", "Invalid or expired access token", StatusCode::UNAUTHORIZED)
            }
            _ => {
                tracing::error!(error = %self, "Request failed");
                json_error("internal_error", "Internal error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Creates the Axum router with the authentication endpoints.
pub fn create_router(state: AppState) -> Router {
    let limited = axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware);
    let hsts_max_age = state.hsts_max_age_seconds;
    let router = Router::new()
        .route("/auth/login", post(auth_login))
        .route("/auth/refresh", post(auth_refresh).route_layer(limited.clone()))
        .route("/auth/logout", post(auth_logout).route_layer(limited))
        .route("/auth/check", get(auth_check))
        .with_state(state);
    security_headers::apply(router, hsts_max_age)
}

fn token_response(state: &AppStateInner, jar: CookieJar, pair: TokenPair) -> Response {
    let jar = jar.add(state.refresh_cookie.issue(&pair.refresh_token));
    (StatusCode::OK, jar, Json(pair)).into_response()
}

/// POST /auth/login
async fn auth_login(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Response {
    match state.auth.login(&client, &payload.username, &payload.password).await {
        Ok(pair) => token_response(&state, jar, pair),
        Err(e) => e.into_response(),
    }
}

/// POST /auth/refresh -- token from the JSON body, else from the cookie
async fn auth_refresh(State(state): State<AppState>, jar: CookieJar, body: Bytes) -> Response {
    let request = if body.is_empty() {
        RefreshRequest::default()
    } else {
        match serde_json::from_slice::<RefreshRequest>(&body) {
            Ok(request) => request,
            Err(_) => {
                return json_error("invalid_request", "Malformed request body", StatusCode::BAD_REQUEST);
            }
        }
    };

    let presented = request
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(state.refresh_cookie.name()).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty());
    let Some(presented) = presented else {
        return AuthError::RefreshInvalid.into_response();
    };

    match state.auth.refresh(&presented).await {
        Ok(pair) => token_response(&state, jar, pair),
        Err(e) => e.into_response(),
    }
}

/// POST /auth/logout -- blacklist the bearer token and revoke the user's refresh tokens
async fn auth_logout(
    State(state): State<AppState>,
    jar: CookieJar,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Response {
    let token = auth.ok().map(|TypedHeader(auth)| auth.token().to_string());
    let username = match &token {
        Some(token) => state.auth.authenticate_request(token).await.map(|claims| claims.sub),
        None => None,
    };

    if let Err(e) = state.auth.logout(token.as_deref(), username.as_deref()).await {
        return e.into_response();
    }

    let jar = jar.add(state.refresh_cookie.clear());
    let body = LogoutResponse { ok: true, message: "Logged out successfully" };
    (StatusCode::OK, jar, Json(body)).into_response()
}

/// GET /auth/check
async fn auth_check(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Response {
    let Ok(TypedHeader(auth)) = auth else {
        return json_error("invalid_token", "Missing bearer token", StatusCode::UNAUTHORIZED);
    };
    match state.auth.verify_request(auth.token()).await {
        Ok(claims) => {
            let body = TokenCheckResponse {
                valid: true,
                username: claims.sub,
                roles: claims.roles.into_iter().collect(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
