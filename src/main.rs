// src/main.rs - tokengate server entry point
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokengate::auth::{InMemoryAuthBackend, spawn_cleanup_task};
use tokengate::clock::{SharedClock, SystemClock};
use tokengate::config::{self, Config, ConfigError};
use tokengate::web::api::{AppStateInner, create_router};
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "tokengate", version, about = "JWT access/refresh token gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "tokengate.toml")]
    config: String,
}

/// Load, override and validate the configuration. The flag is true when the
/// file was missing and defaults were used.
fn load(path: &str) -> Result<(Config, bool), ConfigError> {
    let (mut config, defaulted) = match config::load_config(path) {
        Ok(config) => (config, false),
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => (Config::default(), true),
        Err(e) => return Err(e),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok((config, defaulted))
}

/// Demo accounts until a real credential backend is plugged in.
fn demo_backend() -> InMemoryAuthBackend {
    InMemoryAuthBackend::new()
        .with_user("admin", "admin", &["ROLE_USER", "ROLE_ADMIN"])
        .with_user("user", "user", &["ROLE_USER"])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let loaded = load(&args.config);
    let level = loaded
        .as_ref()
        .ok()
        .and_then(|(config, _)| tracing::Level::from_str(&config.server.log_level).ok())
        .unwrap_or(tracing::Level::INFO);

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting tokengate {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config);

    let (config, defaulted) = loaded.map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if defaulted {
        tracing::warn!("Config file '{}' not found, using defaults", args.config);
    }

    tracing::info!(
        access_ttl_minutes = config.jwt.access_ttl_minutes,
        refresh_ttl_days = config.refresh.ttl_days,
        max_requests = config.rate_limit.max_requests,
        window_seconds = config.rate_limit.window_seconds,
        "Token policy loaded"
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let state = AppStateInner::from_config(&config, Arc::new(demo_backend()), clock.clone());

    let cleanup = spawn_cleanup_task(
        state.auth.refresh_store().clone(),
        state.auth.blacklist().clone(),
        state.auth.rate_limiter().clone(),
        clock,
        config.cleanup.interval(),
    );

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    cleanup.abort();
    Ok(())
}
