//! Stable Identity Resolver
//!
//! Deterministic natural-key -> persistent-UUID mapping. The stable id of a
//! record is a UUIDv5 digest of its canonical natural key under a fixed
//! agent namespace, so the same hardware always resolves to the same uuid
//! across cycles, rescans, and process restarts.

use uuid::Uuid;

use crate::domain::model::StableKey;
use crate::error::Result;
use crate::store::ResourceStore;

/// Namespace under which all stable resource ids are derived. Changing this
/// value would re-identify every resource in the fleet.
pub const AGENT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9a5e_41d2_4c0b_9b3e_7d2a_5c88_01aa);

/// Resolves volatile record ids to stable, restart-surviving uuids.
#[derive(Debug, Clone)]
pub struct StableIdResolver {
    namespace: Uuid,
}

impl Default for StableIdResolver {
    fn default() -> Self {
        Self {
            namespace: AGENT_NAMESPACE,
        }
    }
}

impl StableIdResolver {
    pub fn new(namespace: Uuid) -> Self {
        Self { namespace }
    }

    /// The stable uuid for a natural key, independent of any store state.
    pub fn stable_uuid(&self, key: &StableKey) -> Uuid {
        Uuid::new_v5(&self.namespace, key.canonical().as_bytes())
    }

    /// Resolve a record's stable id.
    ///
    /// If the record is already committed under its volatile id, the store
    /// is rekeyed before returning, so every later reader sees only the
    /// stable id. Callers must extract a complete natural key first; an
    /// incomplete key fails extraction upstream rather than minting a
    /// provisional permanent id here.
    pub fn stabilize(
        &self,
        store: &ResourceStore,
        volatile: Uuid,
        key: &StableKey,
    ) -> Result<Uuid> {
        let stable = self.stable_uuid(key);
        if stable != volatile && store.contains(volatile) {
            store.rekey(volatile, stable)?;
        }
        Ok(stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{KeyPart, Payload, PsuState, ResourceKind, ResourceRecord};

    fn slot_key(kind: ResourceKind, parent: Option<Uuid>, slot: u32) -> StableKey {
        StableKey::new(kind, parent, vec![KeyPart::Slot(slot)])
    }

    #[test]
    fn test_stable_across_volatile_ids() {
        let resolver = StableIdResolver::default();
        let store = ResourceStore::new(ResourceKind::Psu);
        let key = slot_key(ResourceKind::Psu, Some(Uuid::new_v4()), 2);

        let a = resolver.stabilize(&store, Uuid::new_v4(), &key).unwrap();
        let b = resolver.stabilize(&store, Uuid::new_v4(), &key).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stable_across_resolver_instances() {
        // A fresh resolver models a process restart.
        let key = slot_key(ResourceKind::Drawer, None, 0);
        let before = StableIdResolver::default().stable_uuid(&key);
        let after = StableIdResolver::default().stable_uuid(&key);
        assert_eq!(before, after);
    }

    #[test]
    fn test_namespace_partitions_identity() {
        // Agents deployed under different namespaces never collide.
        let key = slot_key(ResourceKind::Psu, None, 1);
        let a = StableIdResolver::new(Uuid::from_u128(1)).stable_uuid(&key);
        let b = StableIdResolver::new(Uuid::from_u128(2)).stable_uuid(&key);
        assert_ne!(a, b);
    }

    #[test]
    fn test_distinct_keys_distinct_ids() {
        let resolver = StableIdResolver::default();
        let parent = Uuid::new_v4();
        let a = resolver.stable_uuid(&slot_key(ResourceKind::Psu, Some(parent), 1));
        let b = resolver.stable_uuid(&slot_key(ResourceKind::Psu, Some(parent), 2));
        let c = resolver.stable_uuid(&slot_key(ResourceKind::Fan, Some(parent), 1));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_stabilize_rekeys_committed_record() {
        let resolver = StableIdResolver::default();
        let store = ResourceStore::new(ResourceKind::Psu);
        let parent = Uuid::new_v4();

        let record = ResourceRecord::new(
            Some(parent),
            Payload::Psu(PsuState {
                slot: 2,
                model: None,
                power_watts: None,
            }),
        );
        let volatile = record.uuid;
        store.add_or_update_entry(record).unwrap();

        let key = slot_key(ResourceKind::Psu, Some(parent), 2);
        let stable = resolver.stabilize(&store, volatile, &key).unwrap();

        assert_ne!(stable, volatile);
        assert!(!store.contains(volatile));
        assert!(store.contains(stable));
    }

    #[test]
    fn test_stabilize_is_noop_when_already_stable() {
        let resolver = StableIdResolver::default();
        let store = ResourceStore::new(ResourceKind::Psu);
        let key = slot_key(ResourceKind::Psu, None, 1);
        let stable = resolver.stable_uuid(&key);

        let resolved = resolver.stabilize(&store, stable, &key).unwrap();
        assert_eq!(resolved, stable);
    }
}
