//! Inbound message queue and the single ingestion task.
//!
//! Transport adapters push `(topic, payload)` pairs into an [`IngestQueue`].
//! One spawned task drains it in arrival order, so no two messages are ever
//! processed concurrently against the aggregation store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::ingest::{IngestOutcome, Ingestor};

// ---

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: Uuid,
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("ingestion worker is not running")]
pub struct QueueClosed;

/// Sending half handed to transport adapters and HTTP handlers.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<InboundMessage>,
}

impl IngestQueue {
    // ---
    /// Enqueue a message, waiting for room if the queue is full.
    pub async fn submit(&self, message: InboundMessage) -> Result<Uuid, QueueClosed> {
        let id = message.id;
        self.tx.send(message).await.map_err(|_| QueueClosed)?;
        Ok(id)
    }
}

/// Spawn the ingestion task and return its queue.
///
/// The task ends once every [`IngestQueue`] clone has been dropped and the
/// queue is drained.
pub fn spawn(ingestor: Arc<Ingestor>, capacity: usize) -> (IngestQueue, JoinHandle<()>) {
    // ---
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run(ingestor, rx));
    (IngestQueue { tx }, handle)
}

async fn run(ingestor: Arc<Ingestor>, mut rx: mpsc::Receiver<InboundMessage>) {
    // ---
    info!("Ingestion worker started");

    while let Some(message) = rx.recv().await {
        let span = tracing::info_span!(
            "ingest",
            message_id = %message.id,
            topic = %message.topic
        );

        async {
            match ingestor.handle(&message.topic, &message.payload).await {
                Ok(IngestOutcome::ScannerLog(report)) if report.skipped > 0 => {
                    warn!(skipped = report.skipped, "Message processed with skipped records");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(kind = %e.kind(), "Message rejected: {}", e);
                }
            }
        }
        .instrument(span)
        .await;
    }

    info!("Ingestion worker stopped");
}
