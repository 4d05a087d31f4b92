//! chassisd - Rack Management Agent
//!
//! A hardware-management agent built around a generic discovery
//! reconciliation engine: it polls physical infrastructure and exposes a
//! consistent resource model with *stable* identity and *exactly-once*
//! lifecycle events to a central controller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Observation Source ──▶ Reconciliation Driver ──▶ Event     │
//! │   (hardware polls)       │        │        │      Queue    │
//! │                          ▼        ▼        ▼               │
//! │                     Identity   Resource  Mark-and-         │
//! │                     Resolver    Stores    Sweep            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per discovery cycle the driver matches live observations against stored
//! records, applies Add/Update/Remove through per-kind hook strategies,
//! stabilizes new identities with a deterministic key digest, and sweeps
//! whatever the scan no longer confirms.
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`agent`] - Dependency-injected context and cycle scheduling
//! - [`domain`] - Resource model, lifecycle events, and ports
//! - [`error`] - Error types
//! - [`identity`] - Stable natural-key -> uuid resolution
//! - [`metrics`] - Prometheus instrumentation
//! - [`reconcile`] - The reconciliation driver, sweep, registry, and kinds
//! - [`store`] - Per-kind keyed storage with touch-epoch tracking

pub mod adapters;
pub mod agent;
pub mod domain;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod reconcile;
pub mod store;

// Re-export commonly used types
pub use agent::{AgentContext, CycleScheduler, SchedulerConfig};
pub use domain::{
    DiscoveryObservation, HealthStatus, LifecycleEvent, Notification, Payload, Probe,
    ResourceKind, ResourceRecord, StableKey,
};
pub use error::{Error, Result};
pub use identity::StableIdResolver;
pub use reconcile::{CycleStats, DriverConfig, KindRegistry, ReconcileDriver};
pub use store::{MutationOutcome, ResourceStore, Scope, StoreSet};
