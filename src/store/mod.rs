//! Persistence boundary for the telemetry pipeline.
//!
//! [`Store`] is implemented by [`PgStore`] for production and by
//! [`MemoryStore`] for local runs and tests. Both honor the same contract:
//! raw observations are append-only, averages are a recomputable view, and
//! the raw transport log is only cleared by [`Store::clear_all`].

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    AverageLinkRate, ProfileSample, PurgeSummary, RawLogEntry, RawObservation, TestGroupMapping,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

// ---

#[async_trait]
pub trait Store: Send + Sync {
    // ---
    /// Append one inbound transport message to the audit log.
    async fn append_raw_log(&self, topic: &str, payload: &str) -> StoreResult<()>;

    async fn raw_logs(&self) -> StoreResult<Vec<RawLogEntry>>;

    /// Append raw observation rows and recompute every average as one unit.
    /// On error neither the rows nor the averages change. Returns rows written.
    async fn append_observations(&self, rows: &[RawObservation]) -> StoreResult<u64>;

    async fn raw_observations(&self) -> StoreResult<Vec<RawObservation>>;

    /// Recompute every average from the raw rows and insert-or-replace by key.
    /// Returns the number of keys written.
    async fn recompute_averages(&self) -> StoreResult<u64>;

    /// Averages ordered by test group, node id, neighbor id.
    async fn average_rates(&self) -> StoreResult<Vec<AverageLinkRate>>;

    async fn find_group_label(&self, app_test_id: &str) -> StoreResult<Option<String>>;

    async fn count_group_mappings(&self) -> StoreResult<u64>;

    async fn group_label_taken(&self, display_name: &str) -> StoreResult<bool>;

    /// Insert a mapping unless the external id or the label already exists.
    /// Returns `false` when nothing was inserted.
    async fn try_insert_group(&self, app_test_id: &str, display_name: &str) -> StoreResult<bool>;

    /// Mappings in creation order.
    async fn group_mappings(&self) -> StoreResult<Vec<TestGroupMapping>>;

    /// Delete raw rows, averages and the mapping for one label. Never touches
    /// the raw transport log.
    async fn purge_group(&self, display_name: &str) -> StoreResult<PurgeSummary>;

    /// Delete everything, including the raw transport log, and reset ids.
    async fn clear_all(&self) -> StoreResult<()>;

    async fn upsert_profile(&self, sample: &ProfileSample) -> StoreResult<()>;

    /// All samples ordered by device id, test method, test group id.
    async fn profile_samples(&self) -> StoreResult<Vec<ProfileSample>>;

    async fn profiles_for_device(&self, device_id: &str) -> StoreResult<Vec<ProfileSample>>;

    async fn delete_device_profiles(&self, device_id: &str) -> StoreResult<u64>;

    async fn delete_profile_group(&self, device_id: &str, test_group_id: &str) -> StoreResult<u64>;
}
