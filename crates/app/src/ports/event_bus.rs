//! Event bus port — publish/subscribe for coordinator events.

use std::future::Future;

use plugwatch_domain::event::Event;

/// Publishes events to interested subscribers.
///
/// Publishing never fails from the caller's point of view: a bus with no
/// subscribers simply drops the event.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send {
        (**self).publish(event)
    }
}
