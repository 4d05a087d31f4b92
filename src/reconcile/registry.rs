//! Kind Registry
//!
//! Per-kind specialization of the shared reconciliation algorithm. Each
//! resource kind supplies a small capability set (discover, update, match,
//! natural-key extraction) registered as a strategy object and looked up by
//! the driver at cycle start. No inheritance, no global registry: the agent
//! context owns the instance and passes it by reference.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::model::{DiscoveryObservation, ResourceKind, ResourceRecord, StableKey};
use crate::domain::ports::SettingsStore;
use crate::error::{Error, Result};
use crate::metrics::RecordGauges;
use crate::store::Scope;

use super::kinds::{
    DrawerHooks, DriveHooks, FanHooks, ManagerHooks, PsuHooks, ZoneHooks,
};

/// Dependencies handed to every hook invocation.
#[derive(Clone)]
pub struct HookContext {
    /// User-set fields not re-derived from hardware (asset tag)
    pub settings: Arc<dyn SettingsStore>,
    /// Per-record hardware gauges
    pub gauges: RecordGauges,
}

impl HookContext {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            gauges: RecordGauges::new(),
        }
    }
}

/// Capability set for one resource kind.
///
/// `discover` is pure construction from the live observation; `update` does
/// the per-field comparison and returns whether anything changed; both may
/// perform hardware I/O and are called under the driver's per-hook timeout.
/// `natural_key` must fail with IncompleteNaturalKey when a required field
/// is not yet known, rather than let a provisional id become permanent.
#[async_trait]
pub trait KindHooks: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ResourceKind;

    /// Kind-specific filter: does this stored record correspond to the
    /// hardware position the observation reports?
    fn matches(&self, record: &ResourceRecord, obs: &DiscoveryObservation) -> bool;

    /// Extract the record's natural key for stabilization.
    fn natural_key(&self, record: &ResourceRecord) -> Result<StableKey>;

    /// Construct a fresh record (volatile id) from a live observation.
    async fn discover(
        &self,
        scope: Scope,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<ResourceRecord>;

    /// Refresh a record's dynamic fields from a live observation.
    async fn update(
        &self,
        record: &mut ResourceRecord,
        obs: &DiscoveryObservation,
        ctx: &HookContext,
    ) -> Result<bool>;
}

/// Registry mapping each kind tag to its capability set.
#[derive(Default)]
pub struct KindRegistry {
    hooks: HashMap<ResourceKind, Arc<dyn KindHooks>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every kind this agent manages.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ZoneHooks));
        registry.register(Arc::new(ManagerHooks));
        registry.register(Arc::new(DrawerHooks));
        registry.register(Arc::new(PsuHooks));
        registry.register(Arc::new(FanHooks));
        registry.register(Arc::new(DriveHooks));
        registry
    }

    pub fn register(&mut self, hooks: Arc<dyn KindHooks>) {
        self.hooks.insert(hooks.kind(), hooks);
    }

    pub fn hooks(&self, kind: ResourceKind) -> Result<Arc<dyn KindHooks>> {
        self.hooks
            .get(&kind)
            .cloned()
            .ok_or(Error::KindNotRegistered(kind))
    }

    pub fn registered_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.hooks.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_cover_all_kinds() {
        let registry = KindRegistry::with_defaults();
        for kind in ResourceKind::ALL {
            assert!(registry.hooks(kind).is_ok(), "missing hooks for {}", kind);
        }
    }

    #[test]
    fn test_unregistered_kind_is_an_error() {
        let registry = KindRegistry::new();
        assert_matches!(
            registry.hooks(ResourceKind::Psu),
            Err(Error::KindNotRegistered(ResourceKind::Psu))
        );
    }
}
