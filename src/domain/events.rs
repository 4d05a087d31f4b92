//! Lifecycle Events
//!
//! Events are immutable records of committed store mutations. The emitter
//! produces exactly one event per mutation, in mutation order within a
//! cycle, and a delivery subsystem forwards them to the central controller.
//!
//! Consumers must treat events as eventually consistent: a reader may see a
//! record removed before its Remove event is delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::ResourceKind;

/// The kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Record committed for the first time
    Add,
    /// Record changed in place
    Update,
    /// Record deleted after a full cycle of absence
    Remove,
}

impl Notification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Notification::Add => "Add",
            Notification::Update => "Update",
            Notification::Remove => "Remove",
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A committed lifecycle transition of one resource record.
///
/// Events for one record are causally ordered (its Add precedes its Update
/// and Remove); no ordering is guaranteed across distinct records or kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: ResourceKind,
    pub uuid: Uuid,
    /// Parent stable uuid; for Remove events this is captured before the
    /// record is deleted.
    pub parent: Option<Uuid>,
    pub notification: Notification,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Create an Add event.
    pub fn add(kind: ResourceKind, uuid: Uuid, parent: Option<Uuid>) -> Self {
        Self {
            kind,
            uuid,
            parent,
            notification: Notification::Add,
            timestamp: Utc::now(),
        }
    }

    /// Create an Update event.
    pub fn update(kind: ResourceKind, uuid: Uuid, parent: Option<Uuid>) -> Self {
        Self {
            kind,
            uuid,
            parent,
            notification: Notification::Update,
            timestamp: Utc::now(),
        }
    }

    /// Create a Remove event with the pre-deletion parent uuid.
    pub fn remove(kind: ResourceKind, uuid: Uuid, parent: Option<Uuid>) -> Self {
        Self {
            kind,
            uuid,
            parent,
            notification: Notification::Remove,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let uuid = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let event = LifecycleEvent::add(ResourceKind::Psu, uuid, Some(parent));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Add"));
        assert!(json.contains(&uuid.to_string()));

        let deserialized: LifecycleEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.notification, Notification::Add);
        assert_eq!(deserialized.uuid, uuid);
        assert_eq!(deserialized.parent, Some(parent));
    }

    #[test]
    fn test_remove_carries_parent() {
        let parent = Uuid::new_v4();
        let event = LifecycleEvent::remove(ResourceKind::Drawer, Uuid::new_v4(), Some(parent));
        assert_eq!(event.notification, Notification::Remove);
        assert_eq!(event.parent, Some(parent));
    }

    #[test]
    fn test_timestamp() {
        let before = Utc::now();
        let event = LifecycleEvent::update(ResourceKind::Fan, Uuid::new_v4(), None);
        let after = Utc::now();

        assert!(event.timestamp >= before);
        assert!(event.timestamp <= after);
    }
}
