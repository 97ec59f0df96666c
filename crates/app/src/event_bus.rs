//! In-process event bus backed by a tokio broadcast channel.
//!
//! ## Delivery and backpressure
//!
//! Every subscriber owns a bounded ring of `capacity` events. Publishing never
//! blocks and never waits for slow observers: when a subscriber falls more
//! than `capacity` events behind, its oldest unread events are overwritten and
//! its next `recv` reports [`broadcast::error::RecvError::Lagged`] with the
//! number of events it lost, after which it continues with the oldest event
//! still retained. Events published while nobody is subscribed are dropped;
//! there is no replay for late subscribers.

use std::future::Future;

use tokio::sync::broadcast;

use plugwatch_domain::event::Event;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given per-subscriber capacity.
    ///
    /// A capacity of zero is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Detach a subscriber; it receives nothing published afterwards.
    pub fn unsubscribe(&self, receiver: broadcast::Receiver<Event>) {
        drop(receiver);
        tracing::debug!(
            remaining = self.sender.receiver_count(),
            "observer unsubscribed"
        );
    }

    /// Number of currently attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send {
        // No subscriber means nobody is listening yet.
        let _ = self.sender.send(event);
        async {}
    }
}
