//! Reconciliation Driver
//!
//! The shared orchestration algorithm: per (kind, parent scope) it brackets
//! a discovery cycle with the store's cycle lock and a sweep window,
//! classifies each live observation against the stored records, and applies
//! the Add/Update/Remove paths through the kind's hook strategy.
//!
//! Failure discipline: a per-record hook failure (hardware I/O, timeout) is
//! logged and skipped without aborting sibling records; an invariant
//! violation excludes the record for the cycle and is escalated in the logs;
//! a whole-scope enumeration failure skips the sweep entirely, since
//! sweeping without a real scan would delete everything in scope.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::events::LifecycleEvent;
use crate::domain::model::{DiscoveryObservation, ResourceKind, ResourceRecord};
use crate::domain::ports::ObservationSource;
use crate::error::{Error, Result};
use crate::identity::StableIdResolver;
use crate::metrics;
use crate::store::{ResourceStore, Scope, StoreSet};

use super::emitter::EventEmitter;
use super::registry::{HookContext, KindHooks, KindRegistry};
use super::sweep::SweepWindow;

// =============================================================================
// Configuration & Stats
// =============================================================================

/// Driver tuning knobs.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Deadline for each discover/update hook invocation. A timeout is a
    /// recoverable per-record failure, never a cycle-wide abort.
    pub hook_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            hook_timeout: Duration::from_secs(10),
        }
    }
}

/// What one discovery cycle did.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub observed: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    /// True when enumeration failed and the sweep was skipped.
    pub enumeration_failed: bool,
}

impl CycleStats {
    fn new(kind: ResourceKind, scope: Scope) -> Self {
        Self {
            kind,
            scope,
            observed: 0,
            added: 0,
            updated: 0,
            removed: 0,
            skipped: 0,
            enumeration_failed: false,
        }
    }

    pub fn mutations(&self) -> usize {
        self.added + self.updated + self.removed
    }
}

/// How one observation was applied.
enum Disposition {
    Added { followup_update: bool },
    Updated { changed: bool },
    Removed(usize),
    None,
}

// =============================================================================
// Driver
// =============================================================================

/// Per-kind reconciliation orchestrator.
///
/// All collaborators are injected; the driver holds no global state and can
/// be cloned per scheduler task.
#[derive(Clone)]
pub struct ReconcileDriver {
    stores: Arc<StoreSet>,
    registry: Arc<KindRegistry>,
    resolver: StableIdResolver,
    source: Arc<dyn ObservationSource>,
    emitter: EventEmitter,
    hook_ctx: HookContext,
    config: DriverConfig,
}

impl ReconcileDriver {
    pub fn new(
        stores: Arc<StoreSet>,
        registry: Arc<KindRegistry>,
        resolver: StableIdResolver,
        source: Arc<dyn ObservationSource>,
        emitter: EventEmitter,
        hook_ctx: HookContext,
        config: DriverConfig,
    ) -> Self {
        Self {
            stores,
            registry,
            resolver,
            source,
            emitter,
            hook_ctx,
            config,
        }
    }

    /// Run one discovery cycle for a kind and parent scope.
    ///
    /// Holds the scope's cycle lock for the duration; concurrent calls for
    /// the same kind+scope queue behind it.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, kind: ResourceKind, scope: Scope) -> Result<CycleStats> {
        let hooks = self.registry.hooks(kind)?;
        let store = self.stores.store(kind);
        let mut stats = CycleStats::new(kind, scope);

        let parent = match scope {
            Some(uuid) => match self.stores.find_record(uuid) {
                Some(record) => Some(record),
                None => {
                    // Parent removed between fan-out and cycle start; its
                    // children will be swept under the surviving topology.
                    debug!(kind = %kind, parent = %uuid, "cycle scope no longer exists");
                    return Ok(stats);
                }
            },
            None => None,
        };

        let _cycle = store.begin_cycle(scope).await;
        let window = SweepWindow::open(store);
        debug!(kind = %kind, epoch_before = window.epoch_before(), "opened sweep window");

        let observations = match self.source.enumerate(kind, parent.as_ref()).await {
            Ok(observations) => observations,
            Err(e) => {
                error!(
                    kind = %kind,
                    error = %e,
                    "enumeration failed; skipping sweep for this cycle"
                );
                metrics::record_cycle(kind, "enumeration_failed");
                stats.enumeration_failed = true;
                return Ok(stats);
            }
        };
        stats.observed = observations.len();

        for obs in &observations {
            if obs.kind != kind {
                warn!(kind = %kind, observed = %obs.kind, "observation for wrong kind; skipping");
                stats.skipped += 1;
                continue;
            }
            match self.reconcile_one(store, &hooks, scope, obs).await {
                Ok(Disposition::Added { followup_update }) => {
                    stats.added += 1;
                    if followup_update {
                        stats.updated += 1;
                    }
                }
                Ok(Disposition::Updated { changed }) => {
                    if changed {
                        stats.updated += 1;
                    }
                }
                Ok(Disposition::Removed(count)) => stats.removed += count,
                Ok(Disposition::None) => {}
                Err(e) if e.is_invariant_violation() => {
                    error!(kind = %kind, error = %e, "invariant violation; record excluded this cycle");
                    stats.skipped += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(kind = %kind, error = %e, "record poll failed; will retry next cycle");
                    stats.skipped += 1;
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "failed to reconcile observation");
                    stats.skipped += 1;
                }
            }
        }

        for uuid in window.stale_keys(store, scope) {
            match self.remove_record(store, uuid).await {
                Ok(()) => stats.removed += 1,
                Err(e) => warn!(kind = %kind, uuid = %uuid, error = %e, "sweep removal failed"),
            }
        }

        metrics::set_resource_count(kind, store.len());
        metrics::record_cycle(kind, "ok");
        if stats.mutations() > 0 {
            info!(
                kind = %kind,
                added = stats.added,
                updated = stats.updated,
                removed = stats.removed,
                "discovery cycle converged"
            );
        } else {
            debug!(kind = %kind, observed = stats.observed, "discovery cycle idle");
        }
        Ok(stats)
    }

    // =========================================================================
    // Classification
    // =========================================================================

    async fn reconcile_one(
        &self,
        store: &ResourceStore,
        hooks: &Arc<dyn KindHooks>,
        scope: Scope,
        obs: &DiscoveryObservation,
    ) -> Result<Disposition> {
        let matches = store.find_keys(scope, |record| hooks.matches(record, obs));

        match (matches.len(), obs.present) {
            (0, false) => Ok(Disposition::None),
            (0, true) => self.apply_add(store, hooks, scope, obs).await,
            (1, true) => self.apply_update(store, hooks, matches[0], obs).await,
            (_, false) => {
                // Absent: converge by removing every match, duplicates
                // included.
                let mut removed = 0;
                for uuid in matches {
                    self.remove_record(store, uuid).await?;
                    removed += 1;
                }
                Ok(Disposition::Removed(removed))
            }
            (_, true) => {
                let key = store
                    .get_entry(matches[0])
                    .ok()
                    .and_then(|record| hooks.natural_key(&record).ok())
                    .map(|key| key.canonical())
                    .unwrap_or_else(|| format!("{:?}", obs.probe));
                Err(Error::DuplicateNaturalKey {
                    kind: hooks.kind(),
                    key,
                })
            }
        }
    }

    // =========================================================================
    // Add Path
    // =========================================================================

    /// First observation of a component: construct, fill, stabilize, commit,
    /// then refresh once more so cycle-dependent metrics are captured before
    /// the record's first exposure.
    async fn apply_add(
        &self,
        store: &ResourceStore,
        hooks: &Arc<dyn KindHooks>,
        scope: Scope,
        obs: &DiscoveryObservation,
    ) -> Result<Disposition> {
        let kind = hooks.kind();

        let mut record = self
            .with_timeout(kind, hooks.discover(scope, obs, &self.hook_ctx))
            .await?;
        self.with_timeout(kind, hooks.update(&mut record, obs, &self.hook_ctx))
            .await?;

        // The refresh above ran while the record still carried its volatile
        // id; any gauges it published are keyed by that id and must not
        // survive past this point.
        let volatile = record.uuid;
        let stable = match self.stabilize_new(store, hooks, &record) {
            Ok(stable) => stable,
            Err(e) => {
                self.hook_ctx.gauges.discard(kind, volatile);
                return Err(e);
            }
        };
        record.uuid = stable;
        if stable != volatile {
            self.hook_ctx.gauges.discard(kind, volatile);
        }
        let parent = record.parent;
        store.add_or_update_entry(record)?;

        // Second refresh on the committed copy, so cycle-dependent metrics
        // land before any event announces the record.
        let mut committed = store.get_entry(stable)?;
        let followup_update = match self
            .with_timeout(kind, hooks.update(&mut committed, obs, &self.hook_ctx))
            .await
        {
            Ok(changed) => {
                if changed {
                    store.add_or_update_entry(committed)?;
                }
                changed
            }
            Err(e) => {
                // The Add is already committed; the refresh retries next
                // cycle.
                warn!(kind = %kind, uuid = %stable, error = %e, "post-add refresh failed");
                false
            }
        };

        self.emitter
            .emit(LifecycleEvent::add(kind, stable, parent))
            .await;
        if followup_update {
            self.emitter
                .emit(LifecycleEvent::update(kind, stable, parent))
                .await;
        }
        Ok(Disposition::Added { followup_update })
    }

    fn stabilize_new(
        &self,
        store: &ResourceStore,
        hooks: &Arc<dyn KindHooks>,
        record: &ResourceRecord,
    ) -> Result<Uuid> {
        let key = hooks.natural_key(record)?;
        let stable = self.resolver.stabilize(store, record.uuid, &key)?;
        debug!(kind = %hooks.kind(), key = %key, uuid = %stable, "stabilized new record");
        Ok(stable)
    }

    // =========================================================================
    // Update Path
    // =========================================================================

    async fn apply_update(
        &self,
        store: &ResourceStore,
        hooks: &Arc<dyn KindHooks>,
        uuid: Uuid,
        obs: &DiscoveryObservation,
    ) -> Result<Disposition> {
        let kind = hooks.kind();
        let mut record = store.get_entry(uuid)?;
        let snapshot = record.clone();

        match self
            .with_timeout(kind, hooks.update(&mut record, obs, &self.hook_ctx))
            .await
        {
            Ok(changed) => {
                let parent = record.parent;
                // Commit even when unchanged: the touch keeps the record out
                // of this cycle's sweep.
                store.add_or_update_entry(record)?;
                if changed {
                    self.emitter
                        .emit(LifecycleEvent::update(kind, uuid, parent))
                        .await;
                }
                Ok(Disposition::Updated { changed })
            }
            Err(e) => {
                // The component was observed present; keep the stale copy
                // alive so a failed refresh does not read as a removal.
                store.add_or_update_entry(snapshot)?;
                Err(e)
            }
        }
    }

    // =========================================================================
    // Remove Path
    // =========================================================================

    async fn remove_record(&self, store: &ResourceStore, uuid: Uuid) -> Result<()> {
        let kind = store.kind();
        // Derived state keyed off this uuid goes first.
        self.hook_ctx.gauges.discard(kind, uuid);

        let mut parent = None;
        store.remove_entry(uuid, |record| parent = record.parent)?;
        self.emitter
            .emit(LifecycleEvent::remove(kind, uuid, parent))
            .await;
        Ok(())
    }

    async fn with_timeout<T, F>(&self, kind: ResourceKind, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.hook_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::HookTimeout {
                kind,
                timeout: self.config.hook_timeout,
            }),
        }
    }
}
