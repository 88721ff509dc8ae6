//! Transport bridge: `POST /api/messages` enqueues one `(topic, payload)` pair.
//!
//! The message bus client lives outside this service; whatever relays its
//! messages posts them here. Processing happens later on the ingestion task,
//! so the response only confirms the message was queued.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::worker::InboundMessage;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    topic: String,
    payload: String,
}

#[derive(Debug, Serialize)]
pub struct MessageAccepted {
    message_id: Uuid,
}

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/messages", post(submit))
}

async fn submit(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<MessageAccepted>), ApiError> {
    // ---
    let message = InboundMessage::new(req.topic, req.payload);
    debug!(message_id = %message.id, topic = %message.topic, "Queueing inbound message");

    let message_id = state.queue.submit(message).await?;
    Ok((StatusCode::ACCEPTED, Json(MessageAccepted { message_id })))
}
