//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so queues, supervisors and the hub
//! can publish without blocking.
//!
//! ```text
//! Publishers (many):                        Consumers:
//!   AdmissionQueue ──┐
//!   ChildGate      ──┼──► Bus ──► hub listener ──► SubscriberSet
//!   run_worker     ──┤        └──► Hub::subscribe() receivers
//!   Hub            ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One shared ring buffer of `capacity` events; slow receivers see `RecvError::Lagged(n)`.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::TaskQueued));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TaskAdmitted));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TaskAdmitted);
    }

    #[tokio::test]
    async fn slow_receiver_lags() {
        let bus = Bus::new(1);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TaskQueued));
        bus.publish(Event::new(EventKind::TaskAdmitted));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TaskAdmitted);
    }
}
