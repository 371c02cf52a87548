//! Synchronous publish/subscribe event bus.
//!
//! Each engine and orchestrator owns its own bus; there is no process-wide
//! listener table. Listeners for one event name run in registration order on
//! the emitting task, before `emit` returns. No ordering is promised across
//! different event names.

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// An event that can travel over an [`EventBus`].
pub trait BusEvent: Send + Sync {
    /// Channel name listeners subscribe to.
    fn event_name(&self) -> &'static str;
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
pub type ListenerId = u64;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerEntry<E> {
    id: ListenerId,
    once: bool,
    listener: Listener<E>,
}

impl<E> Clone for ListenerEntry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            once: self.once,
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Emission counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    /// Events emitted, whether or not anybody listened.
    pub total_events: u64,
    /// Events that reached at least one listener.
    pub delivered_events: u64,
    /// Emission count per event name.
    pub events_by_name: HashMap<String, u64>,
}

/// Publish/subscribe bus for events of type `E`.
pub struct EventBus<E: BusEvent> {
    // Vec keeps event names in first-subscription order.
    channels: RwLock<Vec<(String, Vec<ListenerEntry<E>>)>>,
    next_id: AtomicU64,
    stats: Mutex<EventStats>,
}

impl<E: BusEvent> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            stats: Mutex::new(EventStats::default()),
        }
    }

    /// Subscribe to `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(listener), false)
    }

    /// Subscribe to the next occurrence of `event` only.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(listener), true)
    }

    fn subscribe(&self, event: &str, listener: Listener<E>, once: bool) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = ListenerEntry { id, once, listener };

        let mut channels = self.channels.write();
        match channels.iter_mut().find(|(name, _)| name == event) {
            Some((_, entries)) => entries.push(entry),
            None => channels.push((event.to_string(), vec![entry])),
        }
        trace!(event, listener_id = id, once, "listener subscribed");
        id
    }

    /// Remove one listener. Returns `false` if it was not subscribed to `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.write();
        let Some(index) = channels.iter().position(|(name, _)| name == event) else {
            return false;
        };

        let entries = &mut channels[index].1;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            channels.remove(index);
        }
        removed
    }

    /// Deliver `event` to every listener of its name.
    ///
    /// Returns whether any listener ran. The listener list is snapshotted
    /// before dispatch, so listeners may subscribe or unsubscribe from within
    /// a callback; such changes apply from the next emission.
    pub fn emit(&self, event: &E) -> bool {
        let name = event.event_name();

        let snapshot: Vec<ListenerEntry<E>> = {
            let mut channels = self.channels.write();
            match channels.iter().position(|(channel, _)| channel == name) {
                Some(index) => {
                    let entries = &mut channels[index].1;
                    let snapshot = entries.clone();
                    entries.retain(|entry| !entry.once);
                    if entries.is_empty() {
                        channels.remove(index);
                    }
                    snapshot
                }
                None => Vec::new(),
            }
        };

        {
            let mut stats = self.stats.lock();
            stats.total_events += 1;
            if !snapshot.is_empty() {
                stats.delivered_events += 1;
            }
            *stats.events_by_name.entry(name.to_string()).or_insert(0) += 1;
        }

        for entry in &snapshot {
            (entry.listener)(event);
        }
        !snapshot.is_empty()
    }

    /// Remove all listeners for `event`, or for every event when `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let mut channels = self.channels.write();
        match event {
            Some(event) => channels.retain(|(name, _)| name != event),
            None => channels.clear(),
        }
    }

    /// Number of listeners subscribed to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.channels
            .read()
            .iter()
            .find(|(name, _)| name == event)
            .map_or(0, |(_, entries)| entries.len())
    }

    /// Names of events that currently have listeners.
    pub fn event_names(&self) -> Vec<String> {
        self.channels
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of emission counters.
    pub fn stats(&self) -> EventStats {
        self.stats.lock().clone()
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
