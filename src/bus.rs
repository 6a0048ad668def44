//! Page event bus.
//!
//! Stands in for the page's global event target: listeners register per
//! [`EventType`] and run synchronously, in registration order, when a matching
//! [`PageEvent`] is dispatched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::event::{EventType, PageEvent};

/// Callback invoked for each matching dispatch.
pub type Listener = Arc<dyn Fn(&PageEvent) + Send + Sync>;

/// Handle returned by [`EventBus::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    event_type: EventType,
    listener: Listener,
}

/// In-process publish/subscribe bus keyed by event name.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `listener` for `event_type`.
    pub fn add_listener<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&PageEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                event_type,
                listener: Arc::new(listener),
            });
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|reg| reg.id != id);
        listeners.len() != before
    }

    /// Delivers `event` to every listener registered for its type.
    ///
    /// The listener list is snapshotted first, so listeners may dispatch or
    /// subscribe re-entrantly; listeners added during delivery see the next
    /// dispatch, not this one. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &PageEvent) -> usize {
        let event_type = event.event_type();
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|reg| reg.event_type == event_type)
            .map(|reg| Arc::clone(&reg.listener))
            .collect();

        tracing::trace!(event = %event_type, listeners = matching.len(), "dispatch");
        for listener in &matching {
            listener(event);
        }
        matching.len()
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|reg| reg.event_type == event_type)
            .count()
    }

    /// Event types with at least one listener, in first-registration order.
    pub fn subscribed_types(&self) -> Vec<EventType> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut types = Vec::new();
        for reg in listeners.iter() {
            if !types.contains(&reg.event_type) {
                types.push(reg.event_type);
            }
        }
        types
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribed", &self.subscribed_types())
            .finish()
    }
}
