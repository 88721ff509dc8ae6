//! Data models for the mesh telemetry pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Sender id recorded for compact frames, which carry no sender byte.
pub const UNKNOWN_SENDER: &str = "unknown";

/// A neighbor count at or above this marks the reading as having reached target.
pub const TARGET_COUNT: u8 = 100;

/// Which of the two wire layouts a frame was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLayout {
    /// Exactly 15 bytes, no sender.
    Compact,
    /// 29 bytes or more, sender in the last byte.
    Extended,
}

/// How well one relay heard one neighbor during the reading window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborObservation {
    // ---
    pub neighbor_id: String,
    pub count: u8,
    /// Packets per second; 0 when the window was 0 seconds.
    pub reception_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Decoded form of one telemetry frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub sender_id: String,
    pub layout: FrameLayout,
    pub temperature: u8,
    pub pressure: f64,
    pub elapsed_seconds: u8,
    pub neighbors: Vec<NeighborObservation>,
    pub target_reached: bool,
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    // ---
    /// Flatten into one raw observation row per neighbor.
    pub fn to_observations(&self, test_group: &str, rssi: Option<i32>) -> Vec<RawObservation> {
        // ---
        self.neighbors
            .iter()
            .map(|n| RawObservation {
                sender_device_id: self.sender_id.clone(),
                receiver_device_id: n.neighbor_id.clone(),
                reception_rate: n.reception_rate,
                observed_at: n.timestamp,
                test_group: test_group.to_string(),
                rssi,
            })
            .collect()
    }
}

/// Append-only system-of-record row: one neighbor heard by one sender.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RawObservation {
    // ---
    pub sender_device_id: String,
    pub receiver_device_id: String,
    pub reception_rate: f64,
    pub observed_at: DateTime<Utc>,
    pub test_group: String,
    pub rssi: Option<i32>,
}

/// Mean reception rate per (node, neighbor, test group), derived from [`RawObservation`].
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AverageLinkRate {
    // ---
    pub node_id: String,
    pub neighbor_id: String,
    pub test_group: String,
    pub average_reception_rate: f64,
    pub average_rssi: Option<f64>,
}

/// External test id to display label binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TestGroupMapping {
    pub app_test_id: String,
    pub display_name: String,
}

/// Profile run result for one device under one test method.
///
/// Unique per `(device_id, test_method, test_group_id)`; a resubmission
/// replaces the stored sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileSample {
    // ---
    pub device_id: String,
    pub test_method: String,
    pub test_group_id: String,
    pub avg_tx: f64,
    pub avg_rx: f64,
    pub captured_txs: Vec<i32>,
    pub captured_rxs: Vec<i32>,
    pub recorded_at: DateTime<Utc>,
}

impl ProfileSample {
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.device_id, &self.test_method, &self.test_group_id)
    }
}

/// One row of the ranking snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceScore {
    // ---
    pub rank: u32,
    pub device_id: String,
    pub comprehensive_score: f64,
    pub tx_performance_score: f64,
    pub rx_performance_score: f64,
    pub avg_tx_strength: f64,
    pub avg_tx_stability: f64,
    pub avg_rx_strength: f64,
    pub avg_rx_stability: f64,
}

/// Verbatim inbound transport message, kept for forensic replay.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RawLogEntry {
    pub id: i64,
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Rows removed by a test-group purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub observations: u64,
    pub averages: u64,
    pub mappings: u64,
}

impl PurgeSummary {
    pub fn is_empty(&self) -> bool {
        self.observations == 0 && self.averages == 0 && self.mappings == 0
    }
}
