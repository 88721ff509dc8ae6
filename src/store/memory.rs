//! In-process [`Store`] backend.
//!
//! Used when `STORAGE_BACKEND=memory` and by the test suite. State lives
//! behind one mutex that is never held across an await point.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{Store, StoreResult};
use crate::aggregate::compute_link_averages;
use crate::models::{
    AverageLinkRate, ProfileSample, PurgeSummary, RawLogEntry, RawObservation, TestGroupMapping,
};

type LinkKey = (String, String, String);

#[derive(Default)]
struct State {
    raw_log: Vec<RawLogEntry>,
    next_log_id: i64,
    observations: Vec<RawObservation>,
    averages: BTreeMap<LinkKey, AverageLinkRate>,
    mappings: Vec<TestGroupMapping>,
    profiles: Vec<ProfileSample>,
}

impl State {
    /// Insert-or-replace every average derived from the raw rows.
    fn recompute(&mut self) -> u64 {
        let fresh = compute_link_averages(&self.observations);
        let written = fresh.len() as u64;
        for avg in fresh {
            let key = (
                avg.test_group.clone(),
                avg.node_id.clone(),
                avg.neighbor_id.clone(),
            );
            self.averages.insert(key, avg);
        }
        written
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn sorted_profiles<'a>(it: impl Iterator<Item = &'a ProfileSample>) -> Vec<ProfileSample> {
    let mut out: Vec<ProfileSample> = it.cloned().collect();
    out.sort_by(|a, b| a.key().cmp(&b.key()));
    out
}

// ---

#[async_trait]
impl Store for MemoryStore {
    // ---
    async fn append_raw_log(&self, topic: &str, payload: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.next_log_id += 1;
        let id = state.next_log_id;
        state.raw_log.push(RawLogEntry {
            id,
            topic: topic.to_string(),
            payload: payload.to_string(),
            received_at: Utc::now(),
        });
        Ok(())
    }

    async fn raw_logs(&self) -> StoreResult<Vec<RawLogEntry>> {
        Ok(self.state().raw_log.clone())
    }

    async fn append_observations(&self, rows: &[RawObservation]) -> StoreResult<u64> {
        let mut state = self.state();
        state.observations.extend_from_slice(rows);
        state.recompute();
        Ok(rows.len() as u64)
    }

    async fn raw_observations(&self) -> StoreResult<Vec<RawObservation>> {
        Ok(self.state().observations.clone())
    }

    async fn recompute_averages(&self) -> StoreResult<u64> {
        Ok(self.state().recompute())
    }

    async fn average_rates(&self) -> StoreResult<Vec<AverageLinkRate>> {
        Ok(self.state().averages.values().cloned().collect())
    }

    async fn find_group_label(&self, app_test_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .state()
            .mappings
            .iter()
            .find(|m| m.app_test_id == app_test_id)
            .map(|m| m.display_name.clone()))
    }

    async fn count_group_mappings(&self) -> StoreResult<u64> {
        Ok(self.state().mappings.len() as u64)
    }

    async fn group_label_taken(&self, display_name: &str) -> StoreResult<bool> {
        Ok(self
            .state()
            .mappings
            .iter()
            .any(|m| m.display_name == display_name))
    }

    async fn try_insert_group(&self, app_test_id: &str, display_name: &str) -> StoreResult<bool> {
        // ---
        let mut state = self.state();
        let conflict = state
            .mappings
            .iter()
            .any(|m| m.app_test_id == app_test_id || m.display_name == display_name);
        if conflict {
            return Ok(false);
        }
        state.mappings.push(TestGroupMapping {
            app_test_id: app_test_id.to_string(),
            display_name: display_name.to_string(),
        });
        Ok(true)
    }

    async fn group_mappings(&self) -> StoreResult<Vec<TestGroupMapping>> {
        Ok(self.state().mappings.clone())
    }

    async fn purge_group(&self, display_name: &str) -> StoreResult<PurgeSummary> {
        // ---
        let mut state = self.state();

        let before = state.observations.len();
        state.observations.retain(|o| o.test_group != display_name);
        let observations = (before - state.observations.len()) as u64;

        let before = state.averages.len();
        state.averages.retain(|(group, _, _), _| group != display_name);
        let averages = (before - state.averages.len()) as u64;

        let before = state.mappings.len();
        state.mappings.retain(|m| m.display_name != display_name);
        let mappings = (before - state.mappings.len()) as u64;

        Ok(PurgeSummary {
            observations,
            averages,
            mappings,
        })
    }

    async fn clear_all(&self) -> StoreResult<()> {
        *self.state() = State::default();
        Ok(())
    }

    async fn upsert_profile(&self, sample: &ProfileSample) -> StoreResult<()> {
        // ---
        let mut state = self.state();
        match state.profiles.iter_mut().find(|p| p.key() == sample.key()) {
            Some(existing) => *existing = sample.clone(),
            None => state.profiles.push(sample.clone()),
        }
        Ok(())
    }

    async fn profile_samples(&self) -> StoreResult<Vec<ProfileSample>> {
        Ok(sorted_profiles(self.state().profiles.iter()))
    }

    async fn profiles_for_device(&self, device_id: &str) -> StoreResult<Vec<ProfileSample>> {
        let state = self.state();
        Ok(sorted_profiles(
            state.profiles.iter().filter(|p| p.device_id == device_id),
        ))
    }

    async fn delete_device_profiles(&self, device_id: &str) -> StoreResult<u64> {
        let mut state = self.state();
        let before = state.profiles.len();
        state.profiles.retain(|p| p.device_id != device_id);
        Ok((before - state.profiles.len()) as u64)
    }

    async fn delete_profile_group(&self, device_id: &str, test_group_id: &str) -> StoreResult<u64> {
        let mut state = self.state();
        let before = state.profiles.len();
        state
            .profiles
            .retain(|p| !(p.device_id == device_id && p.test_group_id == test_group_id));
        Ok((before - state.profiles.len()) as u64)
    }
}
