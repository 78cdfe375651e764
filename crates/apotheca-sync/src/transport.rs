//! # Transport Contract
//!
//! The seam between the store and whatever moves envelopes between
//! origins.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  publish(topic, payload)                                                │
//! │    wraps {topic, payload, originId}, sends on every channel,            │
//! │    never fails, never calls this origin's own handlers                  │
//! │                                                                         │
//! │  subscribe(topic, handler) -> Subscription                              │
//! │    handler(payload, originId) for envelopes from OTHER origins          │
//! │    several handlers per topic; dropping the Subscription removes        │
//! │    exactly the one it was returned for                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};

use crate::protocol::{Envelope, Topic};

/// Callback invoked with `(payload, origin_id)`.
pub type Handler = Arc<dyn Fn(&Value, &str) + Send + Sync>;

/// Publish/subscribe between origins.
pub trait Transport: Send + Sync {
    /// Random id of this origin, stamped on every published envelope.
    fn origin_id(&self) -> &str;

    /// Sends `payload` on `topic` over every available channel.
    fn publish(&self, topic: Topic, payload: Value);

    /// Registers `handler` for envelopes on `topic` from other origins.
    fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription;
}

// =============================================================================
// Subscription
// =============================================================================

/// Registration guard. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the action that removes the registration.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Removes the handler now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// =============================================================================
// Handler Registry
// =============================================================================

/// Topic → handlers table shared by a transport and its subscriptions.
#[derive(Default)]
pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(HandlerRegistry::default())
    }

    /// Adds a handler; the returned subscription removes it again.
    pub fn register(self: &Arc<Self>, topic: Topic, handler: Handler) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.entry(topic).or_default().push((id, handler));
            id
        };
        debug!(topic = %topic, handler = id, "Handler subscribed");

        let registry: Weak<HandlerRegistry> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(topic, id);
            }
        })
    }

    fn remove(&self, topic: Topic, id: u64) {
        let mut inner = self.lock();
        if let Some(list) = inner.handlers.get_mut(&topic) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                inner.handlers.remove(&topic);
            }
        }
        debug!(topic = %topic, handler = id, "Handler unsubscribed");
    }

    /// Invokes every handler for the envelope's topic. Returns how many ran.
    ///
    /// Handlers run outside the lock, so they may subscribe or unsubscribe.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let topic = match envelope.topic() {
            Ok(topic) => topic,
            Err(_) => {
                debug!(topic = %envelope.topic, "Dropping envelope with unknown topic");
                return 0;
            }
        };

        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        trace!(topic = %topic, origin = %envelope.origin_id, handlers = handlers.len(), "Dispatching envelope");
        for handler in &handlers {
            handler(&envelope.payload, &envelope.origin_id);
        }
        handlers.len()
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.lock().handlers.get(&topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
