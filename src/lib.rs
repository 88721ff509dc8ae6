//! BLE relay mesh telemetry service.
//!
//! Scanner logs and device profile results arrive as `(topic, payload)`
//! messages. Scanner frames are decoded into per-link reception observations,
//! tagged with a human readable test group label, and folded into per-link
//! averages. Profile results feed a percentile-based device ranking. The
//! `routes` gateway exposes all of it over HTTP.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! module owns one concern and the crate root re-exports the public surface.
use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;

pub mod aggregate;
pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;
pub mod ranking;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod store;
pub mod worker;

pub use aggregate::LinkAggregator;
pub use config::{Config, StorageBackend};
pub use error::{DecodeError, ErrorKind, IngestError, StoreError};
pub use ingest::{IngestOutcome, Ingestor};
pub use resolver::GroupResolver;
pub use store::{MemoryStore, PgStore, Store};
pub use worker::{InboundMessage, IngestQueue};

// ---

/// Wire the aggregator, ingestion worker and HTTP routes around `store`.
///
/// Must be called inside a Tokio runtime; the ingestion task is spawned here
/// and runs until the returned router (and every queue clone) is dropped.
pub fn build_app(store: Arc<dyn Store>, config: &Config) -> (Router, JoinHandle<()>) {
    // ---
    let aggregator = Arc::new(LinkAggregator::new(store.clone()));
    let ingestor = Arc::new(Ingestor::new(store.clone(), aggregator.clone()));
    let (queue, worker) = worker::spawn(ingestor, config.ingest_queue_capacity as usize);

    let state = routes::AppState {
        store,
        aggregator,
        queue,
    };
    (routes::router(state, config), worker)
}
