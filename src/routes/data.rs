//! Read-only views of the stored data: CSV export, averages, raw audit log.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::{ApiError, AppState};
use crate::export;
use crate::models::{AverageLinkRate, RawLogEntry};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/data", get(export_csv))
        .route("/api/averages", get(averages))
        .route("/api/raw_logs", get(raw_logs))
}

async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // ---
    let rows = state.store.average_rates().await?;
    let csv = export::averages_to_csv(&rows)?;
    tracing::debug!(rows = rows.len(), bytes = csv.len(), "CSV export generated");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"data_all.csv\""),
        ],
        csv,
    ))
}

async fn averages(State(state): State<AppState>) -> Result<Json<Vec<AverageLinkRate>>, ApiError> {
    Ok(Json(state.store.average_rates().await?))
}

async fn raw_logs(State(state): State<AppState>) -> Result<Json<Vec<RawLogEntry>>, ApiError> {
    Ok(Json(state.store.raw_logs().await?))
}
