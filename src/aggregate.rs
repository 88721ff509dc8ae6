//! Reception aggregation: raw observation log plus the derived link averages.
//!
//! [`LinkAggregator`] is the only writer of observation data. Label
//! resolution, appending a reading and recomputing the averages happen under
//! one async mutex, so each full recompute reflects exactly one committed
//! append even when the HTTP admin routes purge or clear concurrently with
//! ingestion.
//!
//! Averages are always recomputed from scratch. No running means are kept, so
//! the derived table can be rebuilt bit-for-bit from the raw rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{AverageLinkRate, PurgeSummary, RawObservation, Reading};
use crate::resolver::GroupResolver;
use crate::store::Store;

// ---

pub struct LinkAggregator {
    store: Arc<dyn Store>,
    resolver: GroupResolver,
    write_lock: Mutex<()>,
}

impl LinkAggregator {
    // ---
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            resolver: GroupResolver::new(store.clone()),
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Resolve the label for `app_test_id` and append `reading` under it.
    ///
    /// Both steps run under the writer lock, so a purge cannot remove the
    /// label between resolution and the append. Returns the label and the
    /// number of raw rows written.
    pub async fn ingest_reading(
        &self,
        app_test_id: &str,
        reading: &Reading,
        rssi: Option<i32>,
    ) -> Result<(String, u64), StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        let label = self.resolver.resolve(app_test_id).await?;
        let written = self.append_locked(reading, &label, rssi).await?;
        Ok((label, written))
    }

    /// Persist one raw row per neighbor in `reading`, then recompute all averages.
    ///
    /// Returns the number of raw rows written. A reading with no neighbors
    /// writes nothing and skips the recompute. The rows and the recompute
    /// commit together, so a failed call can be retried as a whole.
    pub async fn append_observation(
        &self,
        reading: &Reading,
        test_group: &str,
        rssi: Option<i32>,
    ) -> Result<u64, StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        self.append_locked(reading, test_group, rssi).await
    }

    /// Caller holds `write_lock`.
    async fn append_locked(
        &self,
        reading: &Reading,
        test_group: &str,
        rssi: Option<i32>,
    ) -> Result<u64, StoreError> {
        // ---
        let rows = reading.to_observations(test_group, rssi);
        if rows.is_empty() {
            debug!(sender = %reading.sender_id, "Reading has no neighbors, nothing to append");
            return Ok(0);
        }

        let written = self.store.append_observations(&rows).await?;
        info!(
            sender = %reading.sender_id,
            test_group,
            rows = written,
            "Saved reception observations and updated averages"
        );
        Ok(written)
    }

    pub async fn recompute_averages(&self) -> Result<u64, StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        self.store.recompute_averages().await
    }

    /// Remove one test group's raw rows, averages and mapping.
    pub async fn purge_group(&self, display_name: &str) -> Result<PurgeSummary, StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        warn!(test_group = display_name, "Deleting all data for test group");

        let summary = self.store.purge_group(display_name).await?;
        if summary.is_empty() {
            return Err(StoreError::not_found("test group", display_name));
        }

        warn!(
            test_group = display_name,
            observations = summary.observations,
            averages = summary.averages,
            mappings = summary.mappings,
            "Test group deleted"
        );
        Ok(summary)
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        warn!("Clearing all stored data");
        self.store.clear_all().await?;
        warn!("All stored data cleared");
        Ok(())
    }
}

/// Group raw rows by (sender, receiver, group) and average each group.
///
/// Sums run in row order, so the same input always yields identical output.
/// Signal strength is averaged over the rows that carry it.
pub fn compute_link_averages(rows: &[RawObservation]) -> Vec<AverageLinkRate> {
    // ---
    #[derive(Default)]
    struct Acc {
        rate_sum: f64,
        rate_n: u64,
        rssi_sum: f64,
        rssi_n: u64,
    }

    let mut groups: BTreeMap<(&str, &str, &str), Acc> = BTreeMap::new();
    for row in rows {
        let acc = groups
            .entry((
                row.test_group.as_str(),
                row.sender_device_id.as_str(),
                row.receiver_device_id.as_str(),
            ))
            .or_default();
        acc.rate_sum += row.reception_rate;
        acc.rate_n += 1;
        if let Some(rssi) = row.rssi {
            acc.rssi_sum += f64::from(rssi);
            acc.rssi_n += 1;
        }
    }

    groups
        .into_iter()
        .map(|((group, node, neighbor), acc)| AverageLinkRate {
            node_id: node.to_string(),
            neighbor_id: neighbor.to_string(),
            test_group: group.to_string(),
            average_reception_rate: acc.rate_sum / acc.rate_n as f64,
            average_rssi: (acc.rssi_n > 0).then(|| acc.rssi_sum / acc.rssi_n as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::decoder;
    use crate::models::{ProfileSample, RawLogEntry, TestGroupMapping};
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// [`MemoryStore`] with injectable append failures and a pause inside
    /// label insertion.
    #[derive(Default)]
    struct HookedStore {
        inner: MemoryStore,
        failing_appends: AtomicUsize,
        pause_label_insert: bool,
        label_insert_entered: Notify,
        label_insert_release: Notify,
    }

    #[async_trait]
    impl Store for HookedStore {
        async fn append_raw_log(&self, topic: &str, payload: &str) -> StoreResult<()> {
            self.inner.append_raw_log(topic, payload).await
        }
        async fn raw_logs(&self) -> StoreResult<Vec<RawLogEntry>> {
            self.inner.raw_logs().await
        }
        async fn append_observations(&self, rows: &[RawObservation]) -> StoreResult<u64> {
            let fail = self
                .failing_appends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.append_observations(rows).await
        }
        async fn raw_observations(&self) -> StoreResult<Vec<RawObservation>> {
            self.inner.raw_observations().await
        }
        async fn recompute_averages(&self) -> StoreResult<u64> {
            self.inner.recompute_averages().await
        }
        async fn average_rates(&self) -> StoreResult<Vec<AverageLinkRate>> {
            self.inner.average_rates().await
        }
        async fn find_group_label(&self, app_test_id: &str) -> StoreResult<Option<String>> {
            self.inner.find_group_label(app_test_id).await
        }
        async fn count_group_mappings(&self) -> StoreResult<u64> {
            self.inner.count_group_mappings().await
        }
        async fn group_label_taken(&self, display_name: &str) -> StoreResult<bool> {
            self.inner.group_label_taken(display_name).await
        }
        async fn try_insert_group(&self, app_test_id: &str, display_name: &str) -> StoreResult<bool> {
            if self.pause_label_insert {
                self.label_insert_entered.notify_one();
                self.label_insert_release.notified().await;
            }
            self.inner.try_insert_group(app_test_id, display_name).await
        }
        async fn group_mappings(&self) -> StoreResult<Vec<TestGroupMapping>> {
            self.inner.group_mappings().await
        }
        async fn purge_group(&self, display_name: &str) -> StoreResult<PurgeSummary> {
            self.inner.purge_group(display_name).await
        }
        async fn clear_all(&self) -> StoreResult<()> {
            self.inner.clear_all().await
        }
        async fn upsert_profile(&self, sample: &ProfileSample) -> StoreResult<()> {
            self.inner.upsert_profile(sample).await
        }
        async fn profile_samples(&self) -> StoreResult<Vec<ProfileSample>> {
            self.inner.profile_samples().await
        }
        async fn profiles_for_device(&self, device_id: &str) -> StoreResult<Vec<ProfileSample>> {
            self.inner.profiles_for_device(device_id).await
        }
        async fn delete_device_profiles(&self, device_id: &str) -> StoreResult<u64> {
            self.inner.delete_device_profiles(device_id).await
        }
        async fn delete_profile_group(&self, device_id: &str, test_group_id: &str) -> StoreResult<u64> {
            self.inner.delete_profile_group(device_id, test_group_id).await
        }
    }

    fn row(sender: &str, receiver: &str, rate: f64, group: &str, rssi: Option<i32>) -> RawObservation {
        RawObservation {
            sender_device_id: sender.into(),
            receiver_device_id: receiver.into(),
            reception_rate: rate,
            observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            test_group: group.into(),
            rssi,
        }
    }

    fn reading(frame: &str) -> Reading {
        decoder::decode(frame, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap()
    }

    #[test]
    fn test_compute_means_per_key() {
        // ---
        let rows = vec![
            row("1", "2", 1.0, "Test #1", Some(-60)),
            row("1", "2", 2.0, "Test #1", None),
            row("1", "2", 4.0, "Test #2", Some(-70)),
            row("1", "3", 0.5, "Test #1", Some(-50)),
        ];
        let avgs = compute_link_averages(&rows);

        assert_eq!(avgs.len(), 3);
        assert_eq!(avgs[0].node_id, "1");
        assert_eq!(avgs[0].neighbor_id, "2");
        assert_eq!(avgs[0].test_group, "Test #1");
        assert_eq!(avgs[0].average_reception_rate, 1.5);
        assert_eq!(avgs[0].average_rssi, Some(-60.0));
        assert_eq!(avgs[1].neighbor_id, "3");
        assert_eq!(avgs[2].test_group, "Test #2");
        assert_eq!(avgs[2].average_reception_rate, 4.0);
    }

    #[test]
    fn test_compute_without_rssi() {
        // ---
        let avgs = compute_link_averages(&[row("1", "2", 1.0, "g", None)]);
        assert_eq!(avgs[0].average_rssi, None);
        assert!(compute_link_averages(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_append_recomputes() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());

        // sender unknown, neighbors 1 (2/6) and 3 (4/6)
        let r = reading("140014010601020304000000000000");
        assert_eq!(agg.append_observation(&r, "Test #1", Some(-60)).await.unwrap(), 2);
        let r = reading("140014010601040300000000000000");
        assert_eq!(agg.append_observation(&r, "Test #1", Some(-50)).await.unwrap(), 2);

        let avgs = store.average_rates().await.unwrap();
        assert_eq!(avgs.len(), 2);
        let link = avgs.iter().find(|a| a.neighbor_id == "1").unwrap();
        assert_eq!(link.average_reception_rate, (2.0 / 6.0 + 4.0 / 6.0) / 2.0);
        assert_eq!(link.average_rssi, Some(-55.0));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());
        agg.append_observation(&reading("140014010301070209030B00000000"), "g", None)
            .await
            .unwrap();
        agg.append_observation(&reading("140014010701020304050600000000"), "g", Some(-71))
            .await
            .unwrap();

        agg.recompute_averages().await.unwrap();
        let first = store.average_rates().await.unwrap();
        agg.recompute_averages().await.unwrap();
        let second = store.average_rates().await.unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
        let bits = |v: &[AverageLinkRate]| {
            v.iter()
                .map(|a| a.average_reception_rate.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&first), bits(&second));
    }

    #[tokio::test]
    async fn test_empty_reading_writes_nothing() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());
        let r = reading("140014010600000000000000000000");
        assert!(r.neighbors.is_empty());
        assert_eq!(agg.append_observation(&r, "g", None).await.unwrap(), 0);
        assert!(store.raw_observations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_raw_log() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());
        store.append_raw_log("log/scanner/upload", "payload-a").await.unwrap();
        store.try_insert_group("grpA", "Test #1").await.unwrap();
        store.try_insert_group("grpB", "Test #2").await.unwrap();
        let r = reading("140014010601020304000000000000");
        agg.append_observation(&r, "Test #1", None).await.unwrap();
        agg.append_observation(&r, "Test #2", None).await.unwrap();

        let summary = agg.purge_group("Test #1").await.unwrap();
        assert_eq!(summary.observations, 2);
        assert_eq!(summary.averages, 2);
        assert_eq!(summary.mappings, 1);

        assert!(store
            .raw_observations()
            .await
            .unwrap()
            .iter()
            .all(|o| o.test_group == "Test #2"));
        assert!(store
            .average_rates()
            .await
            .unwrap()
            .iter()
            .all(|a| a.test_group == "Test #2"));
        assert_eq!(store.find_group_label("grpA").await.unwrap(), None);
        assert_eq!(store.raw_logs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_unknown_group() {
        // ---
        let agg = LinkAggregator::new(Arc::new(MemoryStore::new()));
        let err = agg.purge_group("Test #404").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_clear_all() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());
        store.append_raw_log("t", "p").await.unwrap();
        store.try_insert_group("grpA", "Test #1").await.unwrap();
        agg.append_observation(&reading("140014010601020304000000000000"), "Test #1", None)
            .await
            .unwrap();

        agg.clear_all().await.unwrap();

        assert!(store.raw_observations().await.unwrap().is_empty());
        assert!(store.average_rates().await.unwrap().is_empty());
        assert!(store.group_mappings().await.unwrap().is_empty());
        assert!(store.raw_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_can_be_retried_without_duplicates() {
        // ---
        let store = Arc::new(HookedStore {
            failing_appends: AtomicUsize::new(1),
            ..Default::default()
        });
        let agg = LinkAggregator::new(store.clone());
        let r = reading("140014010601020304000000000000");

        let err = agg.append_observation(&r, "Test #1", Some(-60)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageError);
        assert!(store.raw_observations().await.unwrap().is_empty());
        assert!(store.average_rates().await.unwrap().is_empty());

        assert_eq!(agg.append_observation(&r, "Test #1", Some(-60)).await.unwrap(), 2);
        assert_eq!(store.raw_observations().await.unwrap().len(), 2);
        let link = store
            .average_rates()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.neighbor_id == "1")
            .unwrap();
        assert_eq!(link.average_reception_rate, 2.0 / 6.0);
    }

    #[tokio::test]
    async fn test_purge_waits_for_in_flight_ingest() {
        // ---
        let store = Arc::new(HookedStore {
            pause_label_insert: true,
            ..Default::default()
        });
        let agg = Arc::new(LinkAggregator::new(store.clone()));
        let r = reading("140014010601020304000000000000");

        let ingest = tokio::spawn({
            let agg = agg.clone();
            async move { agg.ingest_reading("grpA", &r, None).await }
        });
        store.label_insert_entered.notified().await;

        // ingest is paused between resolving "Test #1" and appending
        let purge = tokio::spawn({
            let agg = agg.clone();
            async move { agg.purge_group("Test #1").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!purge.is_finished());

        store.label_insert_release.notify_one();
        let (label, written) = ingest.await.unwrap().unwrap();
        assert_eq!(label, "Test #1");
        assert_eq!(written, 2);

        let summary = purge.await.unwrap().unwrap();
        assert_eq!(summary.observations, 2);
        assert_eq!(summary.mappings, 1);

        // no rows are left behind under a label that has no mapping
        assert!(store.raw_observations().await.unwrap().is_empty());
        assert!(store.average_rates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_reading_resolves_label() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let agg = LinkAggregator::new(store.clone());
        let r = reading("140014010601020304000000000000");

        assert_eq!(agg.ingest_reading("grpA", &r, None).await.unwrap().0, "Test #1");
        assert_eq!(agg.ingest_reading("grpB", &r, None).await.unwrap().0, "Test #2");
        assert_eq!(agg.ingest_reading("grpA", &r, None).await.unwrap(), ("Test #1".to_string(), 2));
        assert_eq!(store.raw_observations().await.unwrap().len(), 6);
    }
}
