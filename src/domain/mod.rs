//! Domain Layer
//!
//! Core model and abstractions of the reconciliation engine:
//!
//! - **Model** (`model.rs`) - Resource kinds, records, stable keys, observations
//! - **Events** (`events.rs`) - Lifecycle events emitted for committed mutations
//! - **Ports** (`ports.rs`) - Trait abstractions for external collaborators

pub mod events;
pub mod model;
pub mod ports;

// Re-export commonly used types
pub use events::{LifecycleEvent, Notification};
pub use model::{
    DiscoveryObservation, HealthStatus, Payload, Probe, ResourceKind, ResourceRecord, StableKey,
};
