//! Event Emitter
//!
//! Turns committed store mutations into lifecycle notifications: one event
//! per mutation, in mutation order within a cycle. Updates the driver judged
//! no-ops never reach here.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::events::LifecycleEvent;
use crate::domain::ports::EventSink;
use crate::metrics;

/// Hands lifecycle events to the external queue.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Queue one event. A queue failure is logged and swallowed: event
    /// delivery is eventually consistent and must never abort a cycle.
    pub async fn emit(&self, event: LifecycleEvent) {
        debug!(
            kind = %event.kind,
            uuid = %event.uuid,
            notification = %event.notification,
            "lifecycle event"
        );
        let (kind, notification) = (event.kind, event.notification);
        match self.sink.push_back(event).await {
            Ok(()) => metrics::record_event(kind, notification),
            Err(e) => warn!(kind = %kind, error = %e, "failed to queue lifecycle event"),
        }
    }
}
