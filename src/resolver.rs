//! Maps client-supplied test ids to stable "Test #N" display labels.
//!
//! Labels are assigned on first sight: N is the number of existing mappings
//! plus one. Once assigned, a mapping never changes until its group is purged.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::Store;

/// Insert attempts before giving up on a contended id.
const MAX_ATTEMPTS: usize = 8;

// ---

#[derive(Clone)]
pub struct GroupResolver {
    store: Arc<dyn Store>,
}

impl GroupResolver {
    // ---
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Return the label for `app_test_id`, creating one if this id is new.
    ///
    /// Creation is a single conditional insert guarded by unique constraints on
    /// both the id and the label. A caller that loses a race re-reads instead of
    /// failing, so concurrent callers for one id all see the same label.
    ///
    /// After a purge the count can point at a label that is still in use; the
    /// number is then bumped to the next free one.
    pub async fn resolve(&self, app_test_id: &str) -> Result<String, StoreError> {
        // ---
        for _ in 0..MAX_ATTEMPTS {
            if let Some(label) = self.store.find_group_label(app_test_id).await? {
                return Ok(label);
            }

            let mut n = self.store.count_group_mappings().await? + 1;
            let mut label = display_label(n);
            while self.store.group_label_taken(&label).await? {
                n += 1;
                label = display_label(n);
            }

            if self.store.try_insert_group(app_test_id, &label).await? {
                info!(app_test_id, label = %label, "New test id detected, label assigned");
                return Ok(label);
            }
            debug!(app_test_id, "Lost label insert race, retrying lookup");
        }

        Err(StoreError::LabelConflict(app_test_id.to_string()))
    }
}

pub fn display_label(n: u64) -> String {
    format!("Test #{n}")
}
