use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use std::sync::Arc;
use tokengate::auth::InMemoryAuthBackend;
use tokengate::clock::ManualClock;
use tokengate::config::Config;
use tokengate::web::api::{AppStateInner, create_router};
use tower::ServiceExt; // for .oneshot()

/// Config keyed on forwarding headers so each test can pick its client.
fn trusted() -> Config {
    let mut config = Config::default();
    config.server.trust_forwarded_headers = true;
    config
}

fn app_with(config: Config) -> (Router, ManualClock) {
    let mut config = config;
    config.jwt.secret = "rate-limit-test-secret-32-bytes!!".to_string();
    let clock = ManualClock::starting_now();
    let backend = InMemoryAuthBackend::new().with_user("admin", "password", &["ROLE_ADMIN"]);
    let state = AppStateInner::from_config(&config, Arc::new(backend), Arc::new(clock.clone()));
    (create_router(state), clock)
}

fn login_req(client_ip: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(json!({"username": "admin", "password": password}).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_login_brute_force_is_blocked() {
    let (app, _clock) = app_with(trusted());
    let client_ip = "203.0.113.50";

    // Each failure weighs three requests against the 100-request window.
    for _ in 0..34 {
        let response = app.clone().oneshot(login_req(client_ip, "wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login_req(client_ip, "wrong")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "rate_limit_exceeded");
    assert_eq!(json["retryAfterSeconds"], 60);

    // Correct credentials do not get through a block.
    let response = app.clone().oneshot(login_req(client_ip, "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_login_block_expires() {
    let mut config = trusted();
    config.rate_limit.max_requests = 5;
    let (app, clock) = app_with(config);
    let client_ip = "203.0.113.51";

    // 3 + 3 counts, then the third attempt exceeds 5.
    for _ in 0..2 {
        let response = app.clone().oneshot(login_req(client_ip, "wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login_req(client_ip, "wrong")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance(chrono::Duration::seconds(30));
    let response = app.clone().oneshot(login_req(client_ip, "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");

    clock.advance(chrono::Duration::seconds(30));
    let response = app.clone().oneshot(login_req(client_ip, "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let mut config = trusted();
    config.rate_limit.max_requests = 3;
    let (app, _clock) = app_with(config);

    for _ in 0..2 {
        let _ = app.clone().oneshot(login_req("203.0.113.52", "wrong")).await.unwrap();
    }
    let response = app.clone().oneshot(login_req("203.0.113.52", "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.clone().oneshot(login_req("203.0.113.53", "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // X-Real-IP identifies a client when X-Forwarded-For is absent.
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .header("x-real-ip", "203.0.113.54")
        .body(Body::from(json!({"username": "admin", "password": "password"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_endpoint_is_rate_limited() {
    let mut config = trusted();
    config.rate_limit.max_requests = 3;
    let (app, _clock) = app_with(config);
    let req = || {
        Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.60")
            .body(Body::from(json!({"refreshToken": "guess"}).to_string()))
            .unwrap()
    };

    for _ in 0..3 {
        let response = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(req()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
}

#[tokio::test]
async fn test_forwarded_headers_ignored_by_default() {
    let mut config = Config::default();
    config.rate_limit.max_requests = 5;
    let (app, _clock) = app_with(config);

    // Rotating X-Forwarded-For does not mint a fresh limiter key per request.
    for ip in ["203.0.113.70", "203.0.113.71"] {
        let response = app.clone().oneshot(login_req(ip, "wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login_req("203.0.113.72", "password")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
