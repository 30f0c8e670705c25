//! # Event bus for pool events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]: the keep-alive loop, every worker
//! supervisor and the pool handle publish into it without blocking.
//!
//! ```text
//! keep-alive ──┐
//! supervisor ──┼──► Bus ──► pool listener ──► SubscriberSet
//! pool handle ─┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - Capacity is one shared ring buffer; a lagging receiver skips the oldest events.
//! - No persistence.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pool events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_later_events_only() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::PoolClosing));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::PoolClosed));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::PoolClosed);
    }
}
