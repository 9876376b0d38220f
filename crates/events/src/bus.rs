//! Multi-subscriber event bus for reporter events.

use crate::event::{BuildEvent, ReporterEvent};
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Default capacity of the broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

/// Multi-subscriber event bus.
///
/// Events submitted to the bus are broadcast to every subscriber. Emission
/// is fire-and-forget: a bus with no subscribers, or one that has been shut
/// down, silently drops events.
#[derive(Debug)]
pub struct EventBus {
    /// Taken on shutdown, which drops the sender and lets the forwarding
    /// task exit.
    sender: Mutex<Option<mpsc::UnboundedSender<ReporterEvent>>>,
    broadcast_tx: broadcast::Sender<ReporterEvent>,
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a new event bus with a specific broadcast capacity.
    ///
    /// Spawns a background task forwarding submitted events to the
    /// broadcast channel; must be called inside a tokio runtime.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ReporterEvent>();
        let (broadcast_tx, _) = broadcast::channel(capacity);

        let forward_tx = broadcast_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                // Send errors just mean nobody is listening.
                let _ = forward_tx.send(event);
            }
        });

        Self {
            sender: Mutex::new(Some(sender)),
            broadcast_tx,
        }
    }

    /// Get a sender handle for submitting events.
    ///
    /// Returns `None` after shutdown.
    #[must_use]
    pub fn sender(&self) -> Option<EventSender> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| EventSender { inner: s.clone() }))
    }

    /// Subscribe to events submitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReporterEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    /// Shut down the bus. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            let _ = guard.take();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender handle for submitting events to an [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<ReporterEvent>,
}

impl EventSender {
    /// Submit a build event, stamping identity and timestamp.
    pub fn emit(&self, event: BuildEvent) {
        let _ = self.inner.send(ReporterEvent::new(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BuildPhase;

    fn progress(request: &str) -> BuildEvent {
        BuildEvent::BuildProgress {
            phase: BuildPhase::Transforming,
            request: request.into(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.sender().unwrap().emit(progress("asset_request:1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, progress("asset_request:1"));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.sender().unwrap().emit(progress("asset_request:2"));
        assert_eq!(rx1.recv().await.unwrap().event, progress("asset_request:2"));
        assert_eq!(rx2.recv().await.unwrap().event, progress("asset_request:2"));
    }

    #[tokio::test]
    async fn shutdown_drops_the_sender() {
        let bus = EventBus::new();
        assert!(bus.sender().is_some());
        bus.shutdown();
        assert!(bus.sender().is_none());
        bus.shutdown();
    }

    #[tokio::test]
    async fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.sender().unwrap().emit(progress("asset_request:3"));
    }
}
