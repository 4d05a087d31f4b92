//! Domain Ports (Port/Adapter Pattern)
//!
//! Trait abstractions for the collaborators the reconciliation core depends
//! on. Infrastructure adapters implement these; the core never names a
//! concrete backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Reconciliation Core                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  Ports (Traits)                         │  │
//! │  │  ObservationSource │ EventSink │ SettingsStore         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Infrastructure Layer                         │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  SimulatedChassis │ QueueEventSink │ LoggingEventSink  │  │
//! │  │  InMemorySettingsStore                                 │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::events::LifecycleEvent;
use super::model::{DiscoveryObservation, ResourceKind, ResourceRecord};

// =============================================================================
// Observation Source Port
// =============================================================================

/// Port for enumerating live hardware observations.
///
/// Backed by IPMI, netlink, or vendor-RPC clients in production agents; the
/// core treats the implementation as an opaque side-effecting poll. A failed
/// enumeration means the cycle has no real scan, so the caller must skip its
/// sweep for the cycle.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Enumerate everything the hardware currently reports for `kind` under
    /// the given parent record (None for root-scope kinds).
    async fn enumerate(
        &self,
        kind: ResourceKind,
        parent: Option<&ResourceRecord>,
    ) -> Result<Vec<DiscoveryObservation>>;
}

// =============================================================================
// Event Queue Port
// =============================================================================

/// Port for handing lifecycle events to the delivery subsystem.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Queue a single event.
    async fn push_back(&self, event: LifecycleEvent) -> Result<()>;

    /// Queue multiple events, preserving order.
    async fn push_back_many(&self, events: Vec<LifecycleEvent>) -> Result<()> {
        for event in events {
            self.push_back(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Settings Store Port
// =============================================================================

/// Port for user-set fields that are not re-derived from hardware.
///
/// Keyed by stable uuid + field name, so a value set on a record survives the
/// record's removal and reattaches when the same hardware reappears.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a user-set field for a record.
    async fn get(&self, uuid: Uuid, field: &str) -> Option<String>;

    /// Write a user-set field for a record.
    async fn put(&self, uuid: Uuid, field: &str, value: String);
}
