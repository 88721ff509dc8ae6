use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::aggregate::LinkAggregator;
use crate::store::Store;
use crate::worker::IngestQueue;
use crate::Config;

mod data;
mod error;
mod groups;
mod health;
mod messages;
mod profiles;
mod ranking;

pub use error::ApiError;

// ---

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub aggregator: Arc<LinkAggregator>,
    pub queue: IngestQueue,
}

pub fn router(state: AppState, config: &Config) -> Router {
    // ---
    let app = Router::new()
        .merge(messages::router())
        .merge(groups::router())
        .merge(data::router())
        .merge(ranking::router())
        .merge(profiles::router())
        .merge(health::router())
        .with_state(state);

    match cors_layer(&config.cors_allowed_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    // ---
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
