//! Ingestion coordinator: one transport message in, stored rows out.
//!
//! Two payload shapes arrive on separate topics:
//!
//! - scanner log: `hex,rssi,timestamp,testId` repeated and comma-joined. Each
//!   group of four is independent; a bad timestamp or frame skips only that
//!   group and earlier groups stay committed.
//! - profile result: exactly eight comma-separated fields
//!   `deviceId,avgTx,avgRx,method,timestamp,groupId,tx1;tx2;..,rx1;rx2;..`.
//!   Any bad field rejects the whole message.
//!
//! Every message is written to the raw audit log before it is parsed.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::aggregate::LinkAggregator;
use crate::decoder;
use crate::error::IngestError;
use crate::models::ProfileSample;
use crate::store::Store;

pub const SCANNER_LOG_TOPIC: &str = "log/scanner/upload";
pub const PROFILE_RESULT_TOPIC: &str = "profile/result/upload";
pub const PROFILE_DELETE_TOPIC: &str = "profile/result/delete";

/// Wire timestamp format for both payload shapes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCANNER_FIELDS: usize = 4;
const PROFILE_FIELDS: usize = 8;

// ---

/// One `hex,rssi,timestamp,testId` group of a scanner log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerRecord<'a> {
    pub hex: &'a str,
    pub rssi: &'a str,
    pub timestamp: &'a str,
    pub app_test_id: &'a str,
}

/// Result of one scanner log message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScannerLogReport {
    pub records: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub observations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestOutcome {
    ScannerLog(ScannerLogReport),
    ProfileSaved { device_id: String, test_method: String, test_group_id: String },
    ProfilesDeleted { device_id: String, removed: u64 },
}

/// Split a scanner log into groups of four trimmed tokens.
///
/// A token count that is not a multiple of four rejects the whole payload.
pub fn split_scanner_log(payload: &str) -> Result<Vec<ScannerRecord<'_>>, IngestError> {
    // ---
    let tokens: Vec<&str> = payload.split(',').map(str::trim).collect();
    if tokens.len() % SCANNER_FIELDS != 0 {
        return Err(IngestError::FieldCountMismatch {
            expected: "a multiple of 4",
            actual: tokens.len(),
        });
    }

    Ok(tokens
        .chunks_exact(SCANNER_FIELDS)
        .map(|c| ScannerRecord {
            hex: c[0],
            rssi: c[1],
            timestamp: c[2],
            app_test_id: c[3],
        })
        .collect())
}

/// Parse a `YYYY-MM-DD HH:MM:SS` wire timestamp as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, IngestError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|_| IngestError::TimestampFormat(value.to_string()))
}

/// Parse a profile result payload. No partial results: any bad field fails.
pub fn parse_profile_result(payload: &str) -> Result<ProfileSample, IngestError> {
    // ---
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
    if parts.len() != PROFILE_FIELDS {
        return Err(IngestError::FieldCountMismatch {
            expected: "8",
            actual: parts.len(),
        });
    }

    Ok(ProfileSample {
        device_id: parts[0].to_string(),
        avg_tx: parse_f64("avg_tx", parts[1])?,
        avg_rx: parse_f64("avg_rx", parts[2])?,
        test_method: parts[3].to_string(),
        recorded_at: parse_timestamp(parts[4])?,
        test_group_id: parts[5].to_string(),
        captured_txs: parse_samples("captured_txs", parts[6])?,
        captured_rxs: parse_samples("captured_rxs", parts[7])?,
    })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, IngestError> {
    value.parse::<f64>().map_err(|_| IngestError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Semicolon-joined integers; empty entries are ignored.
fn parse_samples(field: &'static str, value: &str) -> Result<Vec<i32>, IngestError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<i32>().map_err(|_| IngestError::InvalidNumber {
                field,
                value: v.to_string(),
            })
        })
        .collect()
}

// ---

/// Drives the decoder and the aggregator for each inbound message.
///
/// Not meant to process two messages at once; [`crate::worker`] feeds it
/// from a single task.
pub struct Ingestor {
    store: Arc<dyn Store>,
    aggregator: Arc<LinkAggregator>,
}

impl Ingestor {
    // ---
    pub fn new(store: Arc<dyn Store>, aggregator: Arc<LinkAggregator>) -> Self {
        Self { store, aggregator }
    }

    /// Audit-log the message, then dispatch by topic.
    pub async fn handle(&self, topic: &str, payload: &str) -> Result<IngestOutcome, IngestError> {
        // ---
        if let Err(e) = self.store.append_raw_log(topic, payload).await {
            error!("Failed to save raw log: {}", e);
        }

        match topic {
            SCANNER_LOG_TOPIC => {
                debug!("Processing scanner log: {:.100}", payload);
                self.ingest_scanner_log(payload).await.map(IngestOutcome::ScannerLog)
            }
            PROFILE_RESULT_TOPIC => {
                debug!("Processing profile result: {}", payload);
                let sample = self.ingest_profile_result(payload).await?;
                Ok(IngestOutcome::ProfileSaved {
                    device_id: sample.device_id,
                    test_method: sample.test_method,
                    test_group_id: sample.test_group_id,
                })
            }
            PROFILE_DELETE_TOPIC => {
                let device_id = payload.trim().to_string();
                let removed = self.ingest_profile_delete(&device_id).await?;
                Ok(IngestOutcome::ProfilesDeleted { device_id, removed })
            }
            other => Err(IngestError::UnknownTopic(other.to_string())),
        }
    }

    /// Process every four-token group of a scanner log.
    ///
    /// Timestamp and decode failures skip the group. A storage failure stops
    /// the message; groups already written stay written.
    pub async fn ingest_scanner_log(&self, payload: &str) -> Result<ScannerLogReport, IngestError> {
        // ---
        let records = split_scanner_log(payload)?;
        let mut report = ScannerLogReport {
            records: records.len(),
            ..Default::default()
        };

        for (i, record) in records.iter().enumerate() {
            let captured_at = match parse_timestamp(record.timestamp) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(record = i, "Skipping record: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            let reading = match decoder::decode(record.hex, captured_at) {
                Ok(r) => r,
                Err(e) => {
                    warn!(record = i, kind = %e.kind(), "Skipping record {}: {}", record.hex, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let rssi = match record.rssi.parse::<i32>() {
                Ok(v) => Some(v),
                Err(_) => {
                    if !record.rssi.is_empty() {
                        warn!(record = i, "Ignoring unparseable signal strength '{}'", record.rssi);
                    }
                    None
                }
            };

            let (_, written) = self
                .aggregator
                .ingest_reading(record.app_test_id, &reading, rssi)
                .await?;
            report.observations += written;
            report.accepted += 1;
        }

        info!(
            records = report.records,
            accepted = report.accepted,
            skipped = report.skipped,
            observations = report.observations,
            "Scanner log processed"
        );
        Ok(report)
    }

    /// Parse and upsert one profile result.
    pub async fn ingest_profile_result(&self, payload: &str) -> Result<ProfileSample, IngestError> {
        // ---
        let sample = parse_profile_result(payload)?;
        self.store.upsert_profile(&sample).await?;
        info!(
            device_id = %sample.device_id,
            test_method = %sample.test_method,
            test_group_id = %sample.test_group_id,
            "Profile result saved"
        );
        Ok(sample)
    }

    /// Remove every profile sample for a device.
    pub async fn ingest_profile_delete(&self, device_id: &str) -> Result<u64, IngestError> {
        // ---
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(IngestError::EmptyPayload);
        }
        let removed = self.store.delete_device_profiles(device_id).await?;
        info!(device_id, removed, "Profile results deleted");
        Ok(removed)
    }
}
