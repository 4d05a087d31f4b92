//! Event Queue Adapters
//!
//! Implements the `EventSink` port with various backends.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::events::LifecycleEvent;
use crate::domain::ports::EventSink;
use crate::error::Result;

/// Sink that writes lifecycle events to the log stream.
///
/// The default sink of a standalone agent: an operator tailing the logs
/// sees the same notifications the central controller would receive.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink {
    verbose: bool,
}

impl LoggingEventSink {
    /// `verbose` logs events at info; otherwise they go to debug.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn push_back(&self, event: LifecycleEvent) -> Result<()> {
        if self.verbose {
            info!(
                kind = %event.kind,
                uuid = %event.uuid,
                parent = ?event.parent,
                notification = %event.notification,
                "lifecycle event"
            );
        } else {
            debug!(
                kind = %event.kind,
                uuid = %event.uuid,
                parent = ?event.parent,
                notification = %event.notification,
                "lifecycle event"
            );
        }
        Ok(())
    }
}

/// In-memory FIFO event queue.
///
/// The delivery subsystem drains this and forwards notifications to the
/// central controller; tests inspect it directly.
#[derive(Debug, Default)]
pub struct QueueEventSink {
    queue: parking_lot::Mutex<VecDeque<LifecycleEvent>>,
}

impl QueueEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest queued event.
    pub fn pop_front(&self) -> Option<LifecycleEvent> {
        self.queue.lock().pop_front()
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<LifecycleEvent> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for QueueEventSink {
    async fn push_back(&self, event: LifecycleEvent) -> Result<()> {
        self.queue.lock().push_back(event);
        Ok(())
    }

    async fn push_back_many(&self, events: Vec<LifecycleEvent>) -> Result<()> {
        self.queue.lock().extend(events);
        Ok(())
    }
}

/// Composite sink that fans events out to multiple backends.
#[derive(Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the composite.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for CompositeEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn push_back(&self, event: LifecycleEvent) -> Result<()> {
        for sink in &self.sinks {
            sink.push_back(event.clone()).await?;
        }
        Ok(())
    }

    async fn push_back_many(&self, events: Vec<LifecycleEvent>) -> Result<()> {
        for sink in &self.sinks {
            sink.push_back_many(events.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::Notification;
    use crate::domain::model::ResourceKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::new(false);
        let event = LifecycleEvent::add(ResourceKind::Psu, Uuid::new_v4(), None);

        // Should not panic
        sink.push_back(event).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_sink_fifo() {
        let queue = QueueEventSink::new();
        assert!(queue.is_empty());

        let uuid = Uuid::new_v4();
        queue
            .push_back(LifecycleEvent::add(ResourceKind::Fan, uuid, None))
            .await
            .unwrap();
        queue
            .push_back(LifecycleEvent::remove(ResourceKind::Fan, uuid, None))
            .await
            .unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.pop_front().unwrap().notification,
            Notification::Add
        );
        assert_eq!(
            queue.pop_front().unwrap().notification,
            Notification::Remove
        );
        assert!(queue.pop_front().is_none());
    }

    #[tokio::test]
    async fn test_composite_sink() {
        let queue = Arc::new(QueueEventSink::new());
        let composite = CompositeEventSink::new()
            .with_sink(Arc::new(LoggingEventSink::new(false)))
            .with_sink(queue.clone());

        let event = LifecycleEvent::update(ResourceKind::Drawer, Uuid::new_v4(), None);
        composite.push_back(event).await.unwrap();

        assert_eq!(queue.len(), 1);
    }
}
