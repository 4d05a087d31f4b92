//! Error types for the chassis management agent

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::model::ResourceKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the chassis management agent
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Record not found in a store
    #[error("{kind} record not found: {uuid}")]
    NotFound { kind: ResourceKind, uuid: Uuid },

    /// Rekey target key already occupied
    #[error("rekey collision for {kind}: {from} -> {to} (target occupied)")]
    RekeyCollision {
        kind: ResourceKind,
        from: Uuid,
        to: Uuid,
    },

    // =========================================================================
    // Identity Errors
    // =========================================================================
    /// Two live records resolve to the same natural key
    #[error("duplicate natural key for {kind}: {key}")]
    DuplicateNaturalKey { kind: ResourceKind, key: String },

    /// A required natural-key field is not yet known
    #[error("incomplete natural key for {kind}: missing {missing}")]
    IncompleteNaturalKey {
        kind: ResourceKind,
        missing: &'static str,
    },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// No hooks registered for a resource kind
    #[error("no hooks registered for kind: {0}")]
    KindNotRegistered(ResourceKind),

    /// A hook received an observation or payload of the wrong kind
    #[error("payload mismatch for {kind}: expected {expected}")]
    PayloadMismatch {
        kind: ResourceKind,
        expected: &'static str,
    },

    /// Whole-scope enumeration failed for a cycle
    #[error("enumeration failed for {kind}: {detail}")]
    Enumeration { kind: ResourceKind, detail: String },

    /// Transient hardware I/O failure for a single record
    #[error("hardware I/O failure for {kind}: {detail}")]
    HardwareIo { kind: ResourceKind, detail: String },

    /// A discover/update hook exceeded its deadline
    #[error("{kind} hook timed out after {timeout:?}")]
    HookTimeout {
        kind: ResourceKind,
        timeout: Duration,
    },

    /// Event queue rejected an event
    #[error("event queue error: {0}")]
    EventQueue(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inventory file could not be parsed
    #[error("Failed to parse inventory: {0}")]
    InventoryParse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Model invariant violations are escalated (error level) and exclude the
    /// record for the cycle, but never abort siblings or the agent.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::RekeyCollision { .. }
                | Error::DuplicateNaturalKey { .. }
                | Error::IncompleteNaturalKey { .. }
        )
    }

    /// Transient failures are logged at warn and retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::HardwareIo { .. } | Error::HookTimeout { .. } | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let dup = Error::DuplicateNaturalKey {
            kind: ResourceKind::Psu,
            key: "slot=2".to_string(),
        };
        assert!(dup.is_invariant_violation());
        assert!(!dup.is_transient());

        let io = Error::HardwareIo {
            kind: ResourceKind::Fan,
            detail: "bus unreachable".to_string(),
        };
        assert!(io.is_transient());
        assert!(!io.is_invariant_violation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::IncompleteNaturalKey {
            kind: ResourceKind::Drawer,
            missing: "slot",
        };
        assert_eq!(
            err.to_string(),
            "incomplete natural key for drawer: missing slot"
        );
    }
}
