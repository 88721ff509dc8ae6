//! Test group administration: list, delete one, clear everything.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::models::PurgeSummary;

#[derive(Debug, Deserialize)]
pub struct DeleteTestRequest {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    confirm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteTestResponse {
    message: String,
    deleted: PurgeSummary,
}

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/test_groups", get(list_groups))
        .route("/api/delete_test", post(delete_group))
        .route("/api/clear_database", post(clear_database))
}

/// Display labels in creation order.
async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    // ---
    let labels = state
        .store
        .group_mappings()
        .await?
        .into_iter()
        .map(|m| m.display_name)
        .collect();
    Ok(Json(labels))
}

/// Remove one group's raw rows, averages and mapping. The raw transport log stays.
async fn delete_group(
    State(state): State<AppState>,
    Json(req): Json<DeleteTestRequest>,
) -> Result<Json<DeleteTestResponse>, ApiError> {
    // ---
    let display_name = req
        .display_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing \"display_name\" in request body.".into()))?;

    let deleted = state.aggregator.purge_group(&display_name).await?;
    Ok(Json(DeleteTestResponse {
        message: format!("Successfully deleted all data for test group '{display_name}'."),
        deleted,
    }))
}

async fn clear_database(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    // ---
    if req.confirm.as_deref() != Some("yes") {
        return Err(ApiError::BadRequest(
            "Dangerous operation. Please include {\"confirm\": \"yes\"} in the JSON body to confirm."
                .into(),
        ));
    }

    state.aggregator.clear_all().await?;
    info!("Database cleared via API");
    Ok(Json(MessageResponse {
        message: "Database cleared successfully.".into(),
    }))
}
