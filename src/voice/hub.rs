//! Fan-out of channel events to subscribers.
//!
//! ## Ownership:
//! The hub lives inside the channel (`Arc<EventHub>`); each [`Subscription`] holds only a
//! `Weak` back-reference, so an outstanding subscription never keeps a dead channel
//! alive. Dropping or closing a subscription unregisters it.

use super::channel::ChannelEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<ChannelEvent>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new listener. Events emitted after this call are delivered in order.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        debug!(subscription = id, "Voice channel listener registered");
        Subscription {
            id,
            hub: Arc::downgrade(self),
            rx,
            closed: false,
        }
    }

    /// Deliver an event to every live listener.
    pub fn emit(&self, event: ChannelEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        // Receivers that went away without unsubscribing get pruned here
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// A registered listener on a voice channel.
///
/// Closing is idempotent; `Drop` closes too, so a controller that is dropped
/// mid-call leaves no listener behind.
pub struct Subscription {
    id: u64,
    hub: Weak<EventHub>,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: bool,
}

impl Subscription {
    /// Next event, or `None` once closed (or once the channel is gone).
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
        self.rx.close();
        debug!(subscription = self.id, "Voice channel listener released");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();

        hub.emit(ChannelEvent::CallStart);
        hub.emit(ChannelEvent::SpeechStart);
        hub.emit(ChannelEvent::CallEnd);

        assert_eq!(sub.recv().await, Some(ChannelEvent::CallStart));
        assert_eq!(sub.recv().await, Some(ChannelEvent::SpeechStart));
        assert_eq!(sub.recv().await, Some(ChannelEvent::CallEnd));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_unregisters() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        assert_eq!(hub.listener_count(), 1);

        sub.close();
        sub.close();
        assert_eq!(hub.listener_count(), 0);
        assert!(sub.is_closed());

        hub.emit(ChannelEvent::CallStart);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_drop_unregisters() {
        let hub = EventHub::new();
        {
            let _a = hub.subscribe();
            let _b = hub.subscribe();
            assert_eq!(hub.listener_count(), 2);
        }
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_outlives_hub() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        drop(hub);

        assert_eq!(sub.recv().await, None);
        sub.close();
    }
}
