//! Profile result lookups and deletes, per device or per (device, group).

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::{ApiError, AppState};
use crate::models::ProfileSample;

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    removed: u64,
}

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/profiles/{device_id}", get(list).delete(delete_device))
        .route("/api/profiles/{device_id}/{test_group_id}", delete(delete_group))
}

async fn list(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ProfileSample>>, ApiError> {
    // ---
    let samples = state.store.profiles_for_device(&device_id).await?;
    if samples.is_empty() {
        return Err(ApiError::NotFound(format!("No profile results for device '{device_id}'")));
    }
    Ok(Json(samples))
}

async fn delete_device(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    // ---
    let removed = state.store.delete_device_profiles(&device_id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound(format!("No profile results for device '{device_id}'")));
    }
    info!(device_id = %device_id, removed, "Profile results deleted via API");
    Ok(Json(DeletedResponse { removed }))
}

async fn delete_group(
    Path((device_id, test_group_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    // ---
    let removed = state
        .store
        .delete_profile_group(&device_id, &test_group_id)
        .await?;
    if removed == 0 {
        return Err(ApiError::NotFound(format!(
            "No profile results for device '{device_id}' in group '{test_group_id}'"
        )));
    }
    info!(device_id = %device_id, test_group_id = %test_group_id, removed, "Profile results deleted via API");
    Ok(Json(DeletedResponse { removed }))
}
