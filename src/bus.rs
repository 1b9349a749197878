//! In-process synchronous event bus.
//!
//! [`EventBus::publish`] calls every registered [`EventSubscriber`] in
//! registration order on the publishing thread. There is no queue: the bus
//! is a multicast dispatcher. Subscribers that fail or panic are logged and
//! skipped; the publisher never sees their errors.
//!
//! The subscriber list sits behind an `RwLock`. `publish` clones a snapshot
//! of the list and releases the lock before calling anyone, so concurrent
//! publishers never block each other and subscribers may call back into the
//! bus (including `unsubscribe`) without deadlocking.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::models::AgentEvent;
use crate::Result;

/// Receives every event published on the bus.
///
/// Closures of the shape `Fn(&AgentEvent) -> Result<()>` implement this
/// trait directly.
pub trait EventSubscriber: Send + Sync {
    /// Label used in log lines.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the bus and otherwise ignored.
    fn on_event(&self, event: &AgentEvent) -> Result<()>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&AgentEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) -> Result<()> {
        self(event)
    }
}

/// Shared handle to a subscriber, compared by allocation identity.
pub type SubscriberRef = Arc<dyn EventSubscriber>;

fn same_subscriber(a: &SubscriberRef, b: &SubscriberRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Thread-safe multicast dispatcher for [`AgentEvent`]s.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<SubscriberRef>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Registering the same `Arc` twice is a no-op.
    pub fn subscribe(&self, subscriber: SubscriberRef) {
        let mut guard = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.iter().any(|s| same_subscriber(s, &subscriber)) {
            debug!(subscriber = subscriber.name(), "already subscribed");
            return;
        }
        debug!(subscriber = subscriber.name(), "subscribed");
        guard.push(subscriber);
    }

    /// Remove a subscriber if present.
    pub fn unsubscribe(&self, subscriber: &SubscriberRef) {
        let mut guard = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|s| !same_subscriber(s, subscriber));
        if guard.len() != before {
            debug!(subscriber = subscriber.name(), "unsubscribed");
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every subscriber registered at call time.
    pub fn publish(&self, event: &AgentEvent) {
        let snapshot: Vec<SubscriberRef> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(
            event_id = %event.id(),
            kind = event.kind(),
            source = event.source(),
            subscribers = snapshot.len(),
            "publishing event"
        );

        for subscriber in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        subscriber = subscriber.name(),
                        event_id = %event.id(),
                        %err,
                        "event subscriber failed"
                    );
                }
                Err(_) => {
                    error!(
                        subscriber = subscriber.name(),
                        event_id = %event.id(),
                        "event subscriber panicked"
                    );
                }
            }
        }
    }
}
