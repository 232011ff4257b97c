//! Listener registry keyed by event kind
//!
//! Each publisher (reality, session, display) owns an [`EventRegistry`] for
//! its own event enum. Listeners are invoked outside the registry lock, so a
//! listener may subscribe or unsubscribe while handling an event.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A typed event with a discriminating kind used for subscription
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Publish/subscribe registry for one event type
pub struct EventRegistry<E: Event> {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<E::Kind, Vec<(ListenerId, Listener<E>)>>>,
}

impl<E: Event> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register `listener` for events of `kind`
    pub fn subscribe<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for entries in listeners.values_mut() {
            if let Some(index) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to every listener registered for its kind
    pub fn publish(&self, event: &E) {
        let targets: Vec<Listener<E>> = {
            let listeners = self.listeners.read();
            match listeners.get(&event.kind()) {
                Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
                None => return,
            }
        };

        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

impl<E: Event> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum PingKind {
        Ping,
        Pong,
    }

    struct Ping(PingKind);

    impl Event for Ping {
        type Kind = PingKind;

        fn kind(&self) -> PingKind {
            self.0
        }
    }

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let registry = EventRegistry::<Ping>::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let counter = pings.clone();
        registry.subscribe(PingKind::Ping, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.publish(&Ping(PingKind::Ping));
        registry.publish(&Ping(PingKind::Pong));
        assert_eq!(pings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = EventRegistry::<Ping>::new();
        let id = registry.subscribe(PingKind::Pong, |_| {});
        assert_eq!(registry.listener_count(PingKind::Pong), 1);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert_eq!(registry.listener_count(PingKind::Pong), 0);
    }

    #[test]
    fn test_listener_can_subscribe_during_publish() {
        let registry = Arc::new(EventRegistry::<Ping>::new());
        let inner = registry.clone();
        registry.subscribe(PingKind::Ping, move |_| {
            inner.subscribe(PingKind::Pong, |_| {});
        });
        registry.publish(&Ping(PingKind::Ping));
        assert_eq!(registry.listener_count(PingKind::Pong), 1);
    }
}
