//! Application entry point for the `meshlink-telemetry` service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the storage backend (PostgreSQL pool plus schema, or in-memory)
//! - Spawning the ingestion worker and mounting the `routes` gateway (EMBP)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `STORAGE_BACKEND` (optional) – `postgres` (default) or `memory`
//! - `DATABASE_URL` (**required** for postgres) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `HTTP_PORT` (optional) – listen port (default: 8080)
//! - `INGEST_QUEUE_CAPACITY` (optional) – inbound queue bound (default: 1024)
//! - `CORS_ALLOWED_ORIGINS` (optional) – comma-separated allowed origins
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc};

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use meshlink_telemetry::{config, schema, MemoryStore, PgStore, StorageBackend, Store};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store: Arc<dyn Store> = match &cfg.storage {
        StorageBackend::Postgres { db_url } => {
            tracing::info!("Attempting to connect to database");

            let pool = PgPoolOptions::new()
                .max_connections(cfg.db_pool_max)
                .connect(db_url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

            tracing::info!("Successfully connected to database");

            schema::create_schema(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let (app, _worker) = meshlink_telemetry::build_app(store, &cfg);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Target, file, and line number output enabled
/// - Color output from TTY detection, overridden by `FORCE_COLOR`
///   (`1|true|yes` on, `0|false|no` off)
/// - Span events from `AXUM_SPAN_EVENTS`: `full`, `enter_exit`, or CLOSE only
/// - Level from `RUST_LOG`, else `AXUM_LOG_LEVEL` (default `debug`)
///
/// Call once at startup before any logging macros run.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let axum_log_level = env::var("AXUM_LOG_LEVEL").ok();
        let level = match axum_log_level.as_deref() {
            Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level,
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,tower_http=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
