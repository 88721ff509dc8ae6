//! Configuration loader for the `meshlink-telemetry` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, bail, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Where observation data is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL at the given connection string.
    Postgres { db_url: String },
    /// Process memory; lost on restart.
    Memory,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Storage backend and its connection settings.
    pub storage: StorageBackend,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP API listens on.
    pub http_port: u16,

    /// Bound of the inbound message queue.
    pub ingest_queue_capacity: u32,

    /// Origins allowed by CORS. Empty disables the CORS layer.
    pub cors_allowed_origins: Vec<String>,
}

/// In-memory settings for tests and embedding via [`crate::build_app`].
///
/// Unlike [`load_from_env`], which defaults to the postgres backend and
/// requires `DATABASE_URL`.
impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            db_pool_max: 5,
            http_port: 8080,
            ingest_queue_capacity: 1024,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string (only for the postgres backend)
///
/// Optional:
/// - `STORAGE_BACKEND` – `postgres` (default) or `memory`
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_PORT` – API listen port (default: 8080)
/// - `INGEST_QUEUE_CAPACITY` – inbound queue bound (default: 1024)
/// - `CORS_ALLOWED_ORIGINS` – comma-separated origins (default: none)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let storage = match env::var("STORAGE_BACKEND").as_deref() {
        Ok("postgres") | Err(_) => StorageBackend::Postgres {
            db_url: require_env!("DATABASE_URL"),
        },
        Ok("memory") => StorageBackend::Memory,
        Ok(other) => bail!("Invalid STORAGE_BACKEND: {} (expected postgres or memory)", other),
    };

    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let http_port = u16::try_from(parse_env_u32!("HTTP_PORT", 8080))
        .map_err(|e| anyhow!("Invalid HTTP_PORT: {}", e))?;
    let ingest_queue_capacity = parse_env_u32!("INGEST_QUEUE_CAPACITY", 1024);
    let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
        .map(|v| parse_origins(&v))
        .unwrap_or_default();

    Ok(Config {
        storage,
        db_pool_max,
        http_port,
        ingest_queue_capacity,
        cors_allowed_origins,
    })
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Replace the password in a connection string with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // "postgres://host" has its only colon before the slashes
            if !db_url[colon_pos..at_pos].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        match &self.storage {
            StorageBackend::Postgres { db_url } => {
                tracing::info!("  STORAGE_BACKEND       : postgres");
                tracing::info!("  DATABASE_URL          : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX           : {}", self.db_pool_max);
            }
            StorageBackend::Memory => {
                tracing::info!("  STORAGE_BACKEND       : memory");
            }
        }
        tracing::info!("  HTTP_PORT             : {}", self.http_port);
        tracing::info!("  INGEST_QUEUE_CAPACITY : {}", self.ingest_queue_capacity);
        tracing::info!("  CORS_ALLOWED_ORIGINS  : {:?}", self.cors_allowed_origins);
    }
}
