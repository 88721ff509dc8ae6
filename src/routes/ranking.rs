//! `GET /api/ranking` – performance ranking snapshot over all profile samples.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::{ApiError, AppState};
use crate::models::DeviceScore;
use crate::ranking::{self, RankingWeights};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ranking", get(handler))
}

/// Rank devices with optional `strength_weight` / `stability_weight` (default 0.5 each).
///
/// The samples are read in one query, so the ranking sees a single snapshot.
async fn handler(
    Query(weights): Query<RankingWeights>,
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceScore>>, ApiError> {
    // ---
    tracing::info!(
        strength_weight = weights.strength_weight,
        stability_weight = weights.stability_weight,
        "GET /api/ranking"
    );
    let samples = state.store.profile_samples().await?;
    Ok(Json(ranking::rank(&samples, weights)))
}
