//! kb-daemon entry point.
//!
//! Loads config, picks a backend and serves the router. Route handlers live
//! in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use kb_config::{BoardConfig, ConfigConsumer, UnusedKeyPolicy};
use kb_daemon::{backend::Backend, routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if absent.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = kb_config::load_from_env()?;
    let unused = kb_config::report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "config key not read by the daemon");
    }
    let cfg = BoardConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let db = kb_config::resolve_database_url(&cfg);
    let shared = match db.url.as_deref() {
        Some(url) => {
            let pool = kb_db::connect(url, cfg.db_max_connections).await?;
            kb_db::migrate(&pool).await?;
            info!(env_var = %db.env_var, "using postgres backend");
            Arc::new(state::AppState::postgres(pool, cfg.retry_policy()))
        }
        None => {
            warn!(
                env_var = %db.env_var,
                "database url not set; using in-memory backend (state is lost on exit)"
            );
            let backend = Backend::Memory(Default::default());
            Arc::new(state::AppState::with_backend(backend, cfg.retry_policy()))
        }
    };

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or(cfg.daemon_addr);
    info!("kb-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("KB_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
