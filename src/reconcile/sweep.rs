//! Mark-and-Sweep Removal
//!
//! Deletion detection without retaining two full snapshots. A window opened
//! before discovery remembers the store epoch; every confirmed-present
//! record is touched past it during the scan; whatever is still at or below
//! the window afterwards has disappeared from the hardware.
//!
//! The sweep must be skipped entirely when enumeration failed for the cycle:
//! sweeping without a real scan would delete everything in scope.

use uuid::Uuid;

use crate::store::{ResourceStore, Scope};

/// Epoch bracket around one scope's discovery cycle.
#[derive(Debug, Clone, Copy)]
pub struct SweepWindow {
    epoch_before: u64,
}

impl SweepWindow {
    /// Open the window before any observation is reconciled.
    pub fn open(store: &ResourceStore) -> Self {
        Self {
            epoch_before: store.current_epoch(),
        }
    }

    pub fn epoch_before(&self) -> u64 {
        self.epoch_before
    }

    /// In-scope records not touched since the window opened; each is a
    /// removal candidate.
    pub fn stale_keys(&self, store: &ResourceStore, scope: Scope) -> Vec<Uuid> {
        store.find_keys(scope, |record| record.touch_epoch <= self.epoch_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Payload, PsuState, ResourceKind, ResourceRecord};

    fn psu(parent: Option<Uuid>, slot: u32) -> ResourceRecord {
        ResourceRecord::new(
            parent,
            Payload::Psu(PsuState {
                slot,
                model: None,
                power_watts: None,
            }),
        )
    }

    #[test]
    fn test_untouched_records_are_stale() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let parent = Uuid::new_v4();
        let stale = psu(Some(parent), 1);
        let stale_uuid = stale.uuid;
        store.add_or_update_entry(stale).unwrap();

        let window = SweepWindow::open(&store);

        let fresh = psu(Some(parent), 2);
        let fresh_uuid = fresh.uuid;
        store.add_or_update_entry(fresh).unwrap();

        let stale_keys = window.stale_keys(&store, Some(parent));
        assert_eq!(stale_keys, vec![stale_uuid]);
        assert!(!stale_keys.contains(&fresh_uuid));
    }

    #[test]
    fn test_touch_rescues_record_from_sweep() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let record = psu(None, 1);
        let uuid = record.uuid;
        store.add_or_update_entry(record).unwrap();

        let window = SweepWindow::open(&store);
        // Re-commit with identical content: Unchanged, but touched.
        store
            .add_or_update_entry(store.get_entry(uuid).unwrap())
            .unwrap();

        assert!(window.stale_keys(&store, None).is_empty());
    }

    #[test]
    fn test_scope_isolation() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let drawer_a = Uuid::new_v4();
        let drawer_b = Uuid::new_v4();
        store.add_or_update_entry(psu(Some(drawer_a), 1)).unwrap();
        store.add_or_update_entry(psu(Some(drawer_b), 1)).unwrap();

        let window = SweepWindow::open(&store);
        assert_eq!(window.stale_keys(&store, Some(drawer_a)).len(), 1);
        assert_eq!(window.stale_keys(&store, Some(drawer_b)).len(), 1);
        assert!(window.stale_keys(&store, None).is_empty());
    }
}
