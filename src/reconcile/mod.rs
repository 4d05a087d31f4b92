//! Reconciliation Engine
//!
//! The shared discovery reconciliation algorithm and its per-kind
//! specialization:
//!
//! - [`driver`] - cycle orchestration (classify, add/update/remove paths)
//! - [`sweep`] - epoch-based mark-and-sweep removal
//! - [`registry`] - kind tag -> capability-set strategy lookup
//! - [`kinds`] - concrete hook strategies for the managed kinds
//! - [`emitter`] - committed mutations -> lifecycle events

pub mod driver;
pub mod emitter;
pub mod kinds;
pub mod registry;
pub mod sweep;

pub use driver::{CycleStats, DriverConfig, ReconcileDriver};
pub use emitter::EventEmitter;
pub use registry::{HookContext, KindHooks, KindRegistry};
pub use sweep::SweepWindow;
