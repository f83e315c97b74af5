//! Subscriber registries for push events and connection lifecycle events.
//!
//! Multiple handlers may subscribe to the same kind; invocation order is
//! registration order. Handler sets are snapshotted (the handler `Arc`s are
//! cloned out) before dispatch so no lock is ever held while user code
//! runs — a handler may freely subscribe or unsubscribe from within its own
//! invocation.

use crate::events::DisconnectInfo;
use crate::protocol::{PushEvent, PushEventKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Token returned by every subscription; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An ordered set of handlers for one event kind.
struct HandlerSet<E> {
    entries: Vec<(u64, Handler<E>)>,
}

impl<E> Default for HandlerSet<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> HandlerSet<E> {
    fn insert(&mut self, id: u64, handler: Handler<E>) {
        self.entries.push((id, handler));
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<Handler<E>> {
        self.entries.iter().map(|(_, h)| h.clone()).collect()
    }
}

/// Registry of push-event and lifecycle subscribers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    push: Mutex<HashMap<PushEventKind, HandlerSet<PushEvent>>>,
    connected: Mutex<HandlerSet<()>>,
    disconnected: Mutex<HandlerSet<DisconnectInfo>>,
    transport_errors: Mutex<HandlerSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a handler for one push-event kind.
    pub fn subscribe<F>(&self, kind: PushEventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = self.next_handle();
        self.push
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .insert(id, Arc::new(handler));
        SubscriptionHandle(id)
    }

    /// Removes a subscription by handle, whichever set it lives in.
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let SubscriptionHandle(id) = handle;
        if self
            .push
            .lock()
            .unwrap()
            .values_mut()
            .any(|set| set.remove(id))
        {
            return true;
        }
        self.connected.lock().unwrap().remove(id)
            || self.disconnected.lock().unwrap().remove(id)
            || self.transport_errors.lock().unwrap().remove(id)
    }

    pub fn on_connected<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_handle();
        self.connected
            .lock()
            .unwrap()
            .insert(id, Arc::new(move |_: &()| handler()));
        SubscriptionHandle(id)
    }

    pub fn on_disconnected<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&DisconnectInfo) + Send + Sync + 'static,
    {
        let id = self.next_handle();
        self.disconnected.lock().unwrap().insert(id, Arc::new(handler));
        SubscriptionHandle(id)
    }

    pub fn on_transport_error<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_handle();
        self.transport_errors
            .lock()
            .unwrap()
            .insert(id, Arc::new(move |message: &String| handler(message)));
        SubscriptionHandle(id)
    }

    /// Fans a push event out to its kind's subscribers in registration
    /// order. An event with no subscribers is dropped silently.
    pub fn dispatch_push(&self, event: &PushEvent) {
        let handlers = {
            let push = self.push.lock().unwrap();
            match push.get(&event.kind()) {
                Some(set) => set.snapshot(),
                None => Vec::new(),
            }
        };
        if handlers.is_empty() {
            trace!("No subscribers for {:?} push event; dropping", event.kind());
            return;
        }
        for handler in handlers {
            handler(event);
        }
    }

    pub fn notify_connected(&self) {
        let handlers = self.connected.lock().unwrap().snapshot();
        for handler in handlers {
            handler(&());
        }
    }

    pub fn notify_disconnected(&self, info: &DisconnectInfo) {
        let handlers = self.disconnected.lock().unwrap().snapshot();
        for handler in handlers {
            handler(info);
        }
    }

    pub fn notify_transport_error(&self, message: &str) {
        let handlers = self.transport_errors.lock().unwrap().snapshot();
        let message = message.to_string();
        for handler in handlers {
            handler(&message);
        }
    }

    /// Drops every push-event subscription. Lifecycle subscriptions are
    /// kept so observers still see the disconnect that triggered this.
    pub fn clear_push(&self) {
        self.push.lock().unwrap().clear();
    }
}
