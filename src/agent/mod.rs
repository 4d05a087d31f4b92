//! Agent Context & Cycle Scheduling
//!
//! The top-level ownership layer: explicit, dependency-injected store and
//! registry instances (no global singletons) plus the task scheduling that
//! drives discovery: a one-shot initial pass over every kind at agent
//! start, then recurring re-poll passes.
//!
//! Kinds are walked parent-before-child within a pass; the scopes of one
//! kind run concurrently (separate cycle locks), while same-scope cycles
//! serialize inside the store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::model::ResourceKind;
use crate::domain::ports::{EventSink, ObservationSource, SettingsStore};
use crate::identity::StableIdResolver;
use crate::reconcile::{DriverConfig, EventEmitter, HookContext, KindRegistry, ReconcileDriver};
use crate::store::{Scope, StoreSet};

// =============================================================================
// Agent Context
// =============================================================================

/// Everything the reconciliation engine depends on, owned in one place and
/// passed by reference.
pub struct AgentContext {
    pub stores: Arc<StoreSet>,
    pub registry: Arc<KindRegistry>,
    pub resolver: StableIdResolver,
    pub source: Arc<dyn ObservationSource>,
    pub events: Arc<dyn EventSink>,
    pub settings: Arc<dyn SettingsStore>,
}

impl AgentContext {
    pub fn new(
        source: Arc<dyn ObservationSource>,
        events: Arc<dyn EventSink>,
        settings: Arc<dyn SettingsStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stores: Arc::new(StoreSet::new()),
            registry: Arc::new(KindRegistry::with_defaults()),
            resolver: StableIdResolver::default(),
            source,
            events,
            settings,
        })
    }

    /// Build a driver over this context's collaborators.
    pub fn driver(&self, config: DriverConfig) -> ReconcileDriver {
        ReconcileDriver::new(
            Arc::clone(&self.stores),
            Arc::clone(&self.registry),
            self.resolver.clone(),
            Arc::clone(&self.source),
            EventEmitter::new(Arc::clone(&self.events)),
            HookContext::new(Arc::clone(&self.settings)),
            config,
        )
    }
}

// =============================================================================
// Cycle Scheduler
// =============================================================================

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between recurring discovery passes.
    pub poll_interval: Duration,
    /// Kinds that are re-polled after the initial pass. Kinds absent from
    /// this list are discovered once at start and only change when an
    /// external trigger reruns them.
    pub repoll_kinds: Vec<ResourceKind>,
    pub driver: DriverConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            repoll_kinds: ResourceKind::ALL.to_vec(),
            driver: DriverConfig::default(),
        }
    }
}

/// Drives discovery cycles until shutdown.
pub struct CycleScheduler {
    ctx: Arc<AgentContext>,
    driver: ReconcileDriver,
    config: SchedulerConfig,
}

impl CycleScheduler {
    pub fn new(ctx: Arc<AgentContext>, config: SchedulerConfig) -> Self {
        let driver = ctx.driver(config.driver.clone());
        Self {
            ctx,
            driver,
            config,
        }
    }

    /// One full pass over the given kinds, parent kinds first.
    pub async fn run_pass(&self, kinds: &[ResourceKind]) {
        for kind in ResourceKind::ALL {
            if kinds.contains(&kind) {
                self.run_kind(kind).await;
            }
        }
    }

    /// Run every scope of one kind; distinct scopes proceed concurrently.
    async fn run_kind(&self, kind: ResourceKind) {
        let scopes: Vec<Scope> = match kind.parent_kind() {
            None => vec![None],
            Some(parent_kind) => self
                .ctx
                .stores
                .store(parent_kind)
                .all_keys()
                .into_iter()
                .map(Some)
                .collect(),
        };

        let cycles = scopes
            .into_iter()
            .map(|scope| self.driver.run_cycle(kind, scope));
        for result in futures::future::join_all(cycles).await {
            if let Err(e) = result {
                error!(kind = %kind, error = %e, "discovery cycle failed");
            }
        }
    }

    /// Initial pass over every kind, then recurring passes over the re-poll
    /// kinds until the token cancels.
    ///
    /// Cancellation mid-pass is safe: epoch advances and rekeys are
    /// individually atomic, so an abandoned cycle just leaves records
    /// unswept for the next pass.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("running initial discovery pass");
        self.run_pass(&ResourceKind::ALL).await;

        if self.config.repoll_kinds.is_empty() {
            info!("no re-poll kinds configured; scheduler idle until shutdown");
            shutdown.cancelled().await;
            return;
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial pass already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_pass(&self.config.repoll_kinds).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemorySettingsStore, QueueEventSink, SimulatedChassis};
    use crate::domain::events::Notification;

    const SAMPLE: &str = r#"
zones:
  - index: 0
    manager:
      firmware: "2.14.0"
    drawers:
      - slot: 0
        psus:
          - slot: 1
            power_watts: 48.5
          - slot: 2
            power_watts: 51.0
        fans:
          - index: 0
            rpm: 4200
        drives:
          - bay: "bay-0"
            capacity_bytes: 4000000000000
"#;

    #[tokio::test]
    async fn test_initial_pass_builds_topology() {
        let chassis = Arc::new(SimulatedChassis::new(
            serde_yaml::from_str(SAMPLE).unwrap(),
        ));
        let queue = Arc::new(QueueEventSink::new());
        let ctx = AgentContext::new(
            chassis,
            queue.clone(),
            Arc::new(InMemorySettingsStore::new()),
        );
        let scheduler = CycleScheduler::new(ctx.clone(), SchedulerConfig::default());

        scheduler.run_pass(&ResourceKind::ALL).await;

        assert_eq!(ctx.stores.store(ResourceKind::Zone).len(), 1);
        assert_eq!(ctx.stores.store(ResourceKind::Manager).len(), 1);
        assert_eq!(ctx.stores.store(ResourceKind::Drawer).len(), 1);
        assert_eq!(ctx.stores.store(ResourceKind::Psu).len(), 2);
        assert_eq!(ctx.stores.store(ResourceKind::Fan).len(), 1);
        assert_eq!(ctx.stores.store(ResourceKind::Drive).len(), 1);

        let adds = queue
            .drain()
            .into_iter()
            .filter(|e| e.notification == Notification::Add)
            .count();
        assert_eq!(adds, 7);
    }

    #[tokio::test]
    async fn test_hardware_removal_between_passes() {
        let chassis = Arc::new(SimulatedChassis::new(
            serde_yaml::from_str(SAMPLE).unwrap(),
        ));
        let queue = Arc::new(QueueEventSink::new());
        let ctx = AgentContext::new(
            chassis.clone(),
            queue.clone(),
            Arc::new(InMemorySettingsStore::new()),
        );
        let scheduler = CycleScheduler::new(ctx.clone(), SchedulerConfig::default());

        scheduler.run_pass(&ResourceKind::ALL).await;
        queue.drain();

        // A PSU is pulled from the drawer between passes.
        let mut spec: crate::adapters::InventorySpec = serde_yaml::from_str(SAMPLE).unwrap();
        spec.zones[0].drawers[0].psus.pop();
        chassis.set_inventory(spec);

        scheduler.run_pass(&ResourceKind::ALL).await;

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notification, Notification::Remove);
        assert_eq!(events[0].kind, ResourceKind::Psu);
        assert_eq!(ctx.stores.store(ResourceKind::Psu).len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let chassis = Arc::new(SimulatedChassis::new(
            serde_yaml::from_str(SAMPLE).unwrap(),
        ));
        let queue = Arc::new(QueueEventSink::new());
        let ctx = AgentContext::new(
            chassis,
            queue.clone(),
            Arc::new(InMemorySettingsStore::new()),
        );
        let scheduler = CycleScheduler::new(ctx.clone(), SchedulerConfig::default());

        scheduler.run_pass(&ResourceKind::ALL).await;
        queue.drain();

        scheduler.run_pass(&ResourceKind::ALL).await;
        assert!(queue.is_empty());
        assert_eq!(ctx.stores.store(ResourceKind::Psu).len(), 2);
    }
}
