//! Resource Store
//!
//! Per-kind keyed storage with touch-epoch tracking and atomic rekey. One
//! store instance exists per resource kind; the agent context owns them all
//! and passes them by reference into the driver and hooks.
//!
//! Concurrency model: many concurrent readers at any time, one writer (the
//! active cycle) per scope. Per-record reads are atomic; cross-record
//! snapshots are not. Cycles for the same kind+scope serialize on the
//! store-owned cycle lock, since interleaved sweeps would corrupt the epoch
//! bookkeeping.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::model::{ResourceKind, ResourceRecord};
use crate::error::{Error, Result};

/// Parent scope of a cycle: a stable parent uuid, or None for root kinds.
pub type Scope = Option<Uuid>;

// =============================================================================
// Mutation Outcomes
// =============================================================================

/// Outcome of `add_or_update_entry`.
///
/// The coarse status comparison is kept distinct from the full-field
/// comparison; the driver currently events StatusChanged and Updated
/// identically, but tests and logs rely on the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// No record existed under this key
    Added,
    /// Payload or parent differed
    Updated,
    /// Coarse health status differed
    StatusChanged,
    /// Identical content; only the touch epoch advanced
    Unchanged,
}

// =============================================================================
// Store
// =============================================================================

struct StoreInner {
    entries: HashMap<Uuid, ResourceRecord>,
    /// Parent-index linkage: records grouped by scope, ordered for
    /// deterministic iteration.
    by_parent: HashMap<Scope, BTreeSet<Uuid>>,
    /// Store-wide monotonic touch epoch.
    epoch: u64,
}

impl StoreInner {
    fn index_insert(&mut self, scope: Scope, uuid: Uuid) {
        self.by_parent.entry(scope).or_default().insert(uuid);
    }

    fn index_remove(&mut self, scope: Scope, uuid: Uuid) {
        if let Some(set) = self.by_parent.get_mut(&scope) {
            set.remove(&uuid);
            if set.is_empty() {
                self.by_parent.remove(&scope);
            }
        }
    }
}

/// Keyed storage for one resource kind.
pub struct ResourceStore {
    kind: ResourceKind,
    inner: RwLock<StoreInner>,
    /// One active-cycle lock per scope, owned by the store.
    cycle_locks: parking_lot::Mutex<HashMap<Scope, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one discovery cycle; releasing it admits the
/// next cycle for the same kind+scope.
pub struct CycleGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl ResourceStore {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                by_parent: HashMap::new(),
                epoch: 0,
            }),
            cycle_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Acquire the active-cycle lock for a scope.
    ///
    /// Cycles for different scopes proceed in parallel; cycles for the same
    /// scope queue here.
    pub async fn begin_cycle(&self, scope: Scope) -> CycleGuard {
        let lock = {
            let mut locks = self.cycle_locks.lock();
            Arc::clone(locks.entry(scope).or_default())
        };
        CycleGuard {
            _permit: lock.lock_owned().await,
        }
    }

    // =========================================================================
    // Read Surface (serving layer)
    // =========================================================================

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.inner.read().entries.contains_key(&uuid)
    }

    /// Keys of all records in a scope.
    pub fn keys(&self, scope: Scope) -> Vec<Uuid> {
        self.inner
            .read()
            .by_parent
            .get(&scope)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Keys of every record in the store, across scopes.
    pub fn all_keys(&self) -> Vec<Uuid> {
        let inner = self.inner.read();
        let mut keys: Vec<Uuid> = inner.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Keys of in-scope records matching a kind-specific predicate.
    pub fn find_keys<F>(&self, scope: Scope, predicate: F) -> Vec<Uuid>
    where
        F: Fn(&ResourceRecord) -> bool,
    {
        let inner = self.inner.read();
        inner
            .by_parent
            .get(&scope)
            .map(|set| {
                set.iter()
                    .filter(|uuid| inner.entries.get(uuid).is_some_and(&predicate))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fetch a record by primary key.
    pub fn get_entry(&self, uuid: Uuid) -> Result<ResourceRecord> {
        self.inner
            .read()
            .entries
            .get(&uuid)
            .cloned()
            .ok_or(Error::NotFound {
                kind: self.kind,
                uuid,
            })
    }

    /// The current touch epoch; records stamped at or before this value have
    /// not been confirmed present since it was read.
    pub fn current_epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    // =========================================================================
    // Write Surface (active cycle)
    // =========================================================================

    /// Mutate a record in place under the write lock.
    ///
    /// Does not advance the touch epoch; confirmed presence goes through
    /// `add_or_update_entry`. The closure must not reenter the store.
    pub fn with_entry_mut<T, F>(&self, uuid: Uuid, f: F) -> Result<T>
    where
        F: FnOnce(&mut ResourceRecord) -> T,
    {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(&uuid) {
            Some(record) => Ok(f(record)),
            None => Err(Error::NotFound {
                kind: self.kind,
                uuid,
            }),
        }
    }

    /// Commit a record, stamping it with a fresh touch epoch.
    ///
    /// The outcome reports what changed relative to the stored copy; even an
    /// Unchanged commit advances the record's epoch so it survives the next
    /// sweep.
    pub fn add_or_update_entry(&self, record: ResourceRecord) -> Result<MutationOutcome> {
        if record.kind != self.kind {
            return Err(Error::Internal(format!(
                "{} store received a {} record",
                self.kind, record.kind
            )));
        }

        let mut inner = self.inner.write();
        inner.epoch += 1;
        let stamp = inner.epoch;

        let outcome = match inner.entries.get(&record.uuid) {
            None => {
                inner.index_insert(record.parent, record.uuid);
                MutationOutcome::Added
            }
            Some(existing) => {
                let outcome = if existing.status != record.status {
                    MutationOutcome::StatusChanged
                } else if !existing.same_content(&record) {
                    MutationOutcome::Updated
                } else {
                    MutationOutcome::Unchanged
                };
                if existing.parent != record.parent {
                    let (old_parent, uuid) = (existing.parent, record.uuid);
                    inner.index_remove(old_parent, uuid);
                    inner.index_insert(record.parent, uuid);
                }
                outcome
            }
        };

        let mut stored = record;
        stored.touch_epoch = stamp;
        inner.entries.insert(stored.uuid, stored);
        Ok(outcome)
    }

    /// Delete a record.
    ///
    /// The callback runs on the record before it is deleted, so the caller
    /// can capture the parent uuid for the Remove event and clear derived
    /// state. The callback must not reenter the store.
    pub fn remove_entry<F>(&self, uuid: Uuid, on_removed: F) -> Result<()>
    where
        F: FnOnce(&ResourceRecord),
    {
        let mut inner = self.inner.write();
        let record = inner.entries.get(&uuid).cloned().ok_or(Error::NotFound {
            kind: self.kind,
            uuid,
        })?;
        on_removed(&record);
        inner.index_remove(record.parent, uuid);
        inner.entries.remove(&uuid);
        Ok(())
    }

    /// Atomically move a record to a new primary key, preserving content and
    /// parent-index linkage.
    ///
    /// Rekey happens before a record is ever referenced as a parent; a rekey
    /// onto an occupied key is an invariant violation, never an overwrite.
    pub fn rekey(&self, old: Uuid, new: Uuid) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&new) {
            return Err(Error::RekeyCollision {
                kind: self.kind,
                from: old,
                to: new,
            });
        }
        let mut record = inner.entries.remove(&old).ok_or(Error::NotFound {
            kind: self.kind,
            uuid: old,
        })?;
        inner.index_remove(record.parent, old);
        record.uuid = new;
        inner.index_insert(record.parent, new);
        inner.entries.insert(new, record);
        Ok(())
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("epoch", &self.current_epoch())
            .finish()
    }
}

// =============================================================================
// Store Set
// =============================================================================

/// One store per managed kind, owned by the agent context and passed by
/// reference into the driver and serving layer.
#[derive(Debug)]
pub struct StoreSet {
    stores: HashMap<ResourceKind, Arc<ResourceStore>>,
}

impl Default for StoreSet {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSet {
    pub fn new() -> Self {
        let stores = ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, Arc::new(ResourceStore::new(kind))))
            .collect();
        Self { stores }
    }

    pub fn store(&self, kind: ResourceKind) -> &Arc<ResourceStore> {
        // Every kind is populated by the constructor.
        &self.stores[&kind]
    }

    /// Locate a record by uuid across kinds; used to resolve a cycle's
    /// parent scope into the parent record.
    pub fn find_record(&self, uuid: Uuid) -> Option<ResourceRecord> {
        self.stores
            .values()
            .find_map(|store| store.get_entry(uuid).ok())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HealthStatus, Payload, PsuState};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn psu_record(parent: Option<Uuid>, slot: u32, watts: f64) -> ResourceRecord {
        ResourceRecord::new(
            parent,
            Payload::Psu(PsuState {
                slot,
                model: None,
                power_watts: Some(watts),
            }),
        )
    }

    #[test]
    fn test_add_then_update_then_unchanged() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let parent = Uuid::new_v4();
        let record = psu_record(Some(parent), 2, 50.0);
        let uuid = record.uuid;

        assert_matches!(
            store.add_or_update_entry(record.clone()),
            Ok(MutationOutcome::Added)
        );

        let mut changed = store.get_entry(uuid).unwrap();
        changed.payload.as_psu_mut().unwrap().power_watts = Some(55.0);
        assert_matches!(
            store.add_or_update_entry(changed.clone()),
            Ok(MutationOutcome::Updated)
        );

        assert_matches!(
            store.add_or_update_entry(store.get_entry(uuid).unwrap()),
            Ok(MutationOutcome::Unchanged)
        );
    }

    #[test]
    fn test_status_change_is_coarse() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let record = psu_record(None, 1, 40.0);
        let uuid = record.uuid;
        store.add_or_update_entry(record).unwrap();

        let mut degraded = store.get_entry(uuid).unwrap();
        degraded.status = HealthStatus::Critical;
        assert_matches!(
            store.add_or_update_entry(degraded),
            Ok(MutationOutcome::StatusChanged)
        );
    }

    #[test]
    fn test_touch_advances_epoch_even_when_unchanged() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let record = psu_record(None, 1, 40.0);
        let uuid = record.uuid;
        store.add_or_update_entry(record).unwrap();
        let first = store.get_entry(uuid).unwrap().touch_epoch;

        store
            .add_or_update_entry(store.get_entry(uuid).unwrap())
            .unwrap();
        let second = store.get_entry(uuid).unwrap().touch_epoch;

        assert!(second > first);
        assert_eq!(store.current_epoch(), second);
    }

    #[test]
    fn test_with_entry_mut_does_not_touch() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let record = psu_record(None, 1, 40.0);
        let uuid = record.uuid;
        store.add_or_update_entry(record).unwrap();
        let epoch = store.current_epoch();

        store
            .with_entry_mut(uuid, |r| {
                r.payload.as_psu_mut().unwrap().power_watts = Some(42.0);
            })
            .unwrap();

        assert_eq!(
            store.get_entry(uuid).unwrap().payload.as_psu().unwrap().power_watts,
            Some(42.0)
        );
        // In-place mutation is not a confirmed presence.
        assert_eq!(store.current_epoch(), epoch);

        assert_matches!(
            store.with_entry_mut(Uuid::new_v4(), |_| ()),
            Err(Error::NotFound { .. })
        );
    }

    #[test]
    fn test_rekey_preserves_content_and_index() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let parent = Uuid::new_v4();
        let record = psu_record(Some(parent), 3, 60.0);
        let old = record.uuid;
        store.add_or_update_entry(record).unwrap();

        let new = Uuid::new_v4();
        store.rekey(old, new).unwrap();

        assert!(!store.contains(old));
        let moved = store.get_entry(new).unwrap();
        assert_eq!(moved.uuid, new);
        assert_eq!(moved.payload.as_psu().unwrap().slot, 3);
        assert_eq!(store.keys(Some(parent)), vec![new]);
    }

    #[test]
    fn test_rekey_collision_is_fatal() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let a = psu_record(None, 1, 40.0);
        let b = psu_record(None, 2, 40.0);
        let (ua, ub) = (a.uuid, b.uuid);
        store.add_or_update_entry(a).unwrap();
        store.add_or_update_entry(b).unwrap();

        let err = store.rekey(ua, ub).unwrap_err();
        assert!(err.is_invariant_violation());
        // Both records untouched
        assert!(store.contains(ua));
        assert!(store.contains(ub));
    }

    #[test]
    fn test_remove_callback_sees_record_before_deletion() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let parent = Uuid::new_v4();
        let record = psu_record(Some(parent), 2, 50.0);
        let uuid = record.uuid;
        store.add_or_update_entry(record).unwrap();

        let mut captured = None;
        store
            .remove_entry(uuid, |r| captured = r.parent)
            .unwrap();

        assert_eq!(captured, Some(parent));
        assert!(!store.contains(uuid));
        assert!(store.keys(Some(parent)).is_empty());
    }

    #[test]
    fn test_find_keys_filters_by_scope_and_predicate() {
        let store = ResourceStore::new(ResourceKind::Psu);
        let drawer_a = Uuid::new_v4();
        let drawer_b = Uuid::new_v4();
        store
            .add_or_update_entry(psu_record(Some(drawer_a), 1, 40.0))
            .unwrap();
        store
            .add_or_update_entry(psu_record(Some(drawer_a), 2, 40.0))
            .unwrap();
        store
            .add_or_update_entry(psu_record(Some(drawer_b), 1, 40.0))
            .unwrap();

        let slot_1_in_a = store.find_keys(Some(drawer_a), |r| {
            r.payload.as_psu().map(|p| p.slot) == Some(1)
        });
        assert_eq!(slot_1_in_a.len(), 1);
        assert_eq!(store.keys(Some(drawer_a)).len(), 2);
        assert_eq!(store.all_keys().len(), 3);
    }

    #[tokio::test]
    async fn test_cycle_lock_serializes_same_scope() {
        let store = Arc::new(ResourceStore::new(ResourceKind::Psu));
        let scope = Some(Uuid::new_v4());

        let guard = store.begin_cycle(scope).await;

        // Same scope blocks until the guard drops.
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), store.begin_cycle(scope)).await;
        assert!(blocked.is_err());

        // A different scope proceeds immediately.
        let other =
            tokio::time::timeout(Duration::from_millis(20), store.begin_cycle(None)).await;
        assert!(other.is_ok());

        drop(guard);
        let unblocked =
            tokio::time::timeout(Duration::from_millis(20), store.begin_cycle(scope)).await;
        assert!(unblocked.is_ok());
    }
}
