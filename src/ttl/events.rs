//! Background Event Channel
//!
//! Failures in the expiration index and in the sweeper never abort a
//! caller's write. They are logged and published here instead, so the host
//! application can watch for them. Completed sweeps are published too.
//!
//! The channel is a `tokio::sync::broadcast`: every subscriber sees every
//! event sent after it subscribed, slow subscribers lose the oldest events,
//! and sending with no subscribers is a no-op.

use crate::error::TtlError;
use crate::ttl::sweeper::SweepReport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Number of events buffered per subscriber before the oldest are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened in the background.
#[derive(Debug, Clone)]
pub enum TtlEvent {
    /// A non-fatal index, scan or sweep-delete failure.
    Error(Arc<TtlError>),
    /// A sweep finished (or was abandoned; see the report).
    SweepCompleted(SweepReport),
}

impl TtlEvent {
    /// Returns the error carried by this event, if any.
    pub fn as_error(&self) -> Option<&TtlError> {
        match self {
            TtlEvent::Error(err) => Some(err.as_ref()),
            TtlEvent::SweepCompleted(_) => None,
        }
    }
}

/// Publishes [`TtlEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TtlEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with [`EVENT_CHANNEL_CAPACITY`] slots.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Returns a receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TtlEvent> {
        self.tx.subscribe()
    }

    /// Logs and publishes a non-fatal error.
    pub fn emit_error(&self, err: TtlError) {
        warn!(error = %err, "TTL background operation failed");
        self.emit(TtlEvent::Error(Arc::new(err)));
    }

    /// Publishes an event. Never blocks and never fails.
    pub fn emit(&self, event: TtlEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_subscriber_receives_errors() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit_error(TtlError::Index(StoreError::Closed));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_error(),
            Some(TtlError::Index(StoreError::Closed))
        ));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit_error(TtlError::Scan(StoreError::Closed));
        bus.emit(TtlEvent::SweepCompleted(SweepReport::default()));
    }
}
