//! Event bus broadcasting runtime changes to listeners.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{DropReason, ListenerConfig, ListenerHandle, ListenerId, RuntimeEvent};

/// Internal listener state.
struct Listener {
    config: ListenerConfig,
    sender: Sender<RuntimeEvent>,
}

impl Listener {
    /// Try to send an event. Returns false if buffer is full (listener will be dropped).
    fn try_send(&self, event: RuntimeEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Fans runtime events out to registered listeners.
pub struct EventBus {
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn subscribe(&self, config: ListenerConfig) -> ListenerHandle {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.listeners.write().insert(id, Listener { config, sender });

        ListenerHandle { id, receiver }
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        if let Some(listener) = self.listeners.write().remove(&id) {
            // Best effort
            let _ = listener.sender.try_send(RuntimeEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an event to every matching listener. Listeners that cannot
    /// keep up are dropped.
    pub fn publish(&self, event: RuntimeEvent) {
        let mut to_remove = Vec::new();

        {
            let listeners = self.listeners.read();
            if listeners.is_empty() {
                return;
            }
            for (id, listener) in listeners.iter() {
                if listener.config.filter.matches(&event) && !listener.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.listeners.write();
            for id in to_remove {
                if let Some(listener) = listeners.remove(&id) {
                    debug!(listener = id.0, "dropping slow event listener");
                    // Might fail, that's ok
                    let _ = listener.sender.try_send(RuntimeEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
