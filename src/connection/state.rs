//! Aggregate connection state machine.

use crate::error::Result;
use crate::types::ConnectionState;
use tracing::{debug, info};

use super::registry::{DataLoaderEntry, DataLoaderRegistry};

/// A change of the aggregate connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Desired activity plus the state derived from the required loaders.
///
/// The aggregate state is never set directly; `update_status` recomputes it
/// after every individual loader state change.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    active: bool,
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            active: false,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Recompute the aggregate state from the required loaders.
    pub fn update_status(&mut self, registry: &DataLoaderRegistry) -> Option<StateTransition> {
        let next = registry.aggregate_state();
        if next == self.state {
            return None;
        }

        let transition = StateTransition {
            from: self.state,
            to: next,
        };
        info!(from = ?transition.from, to = ?transition.to, "connection state changed");
        self.state = next;
        Some(transition)
    }

    /// Ask loaders to move toward the desired state. Returns how many
    /// connect/disconnect requests were issued.
    pub fn reflect_active_state(&self, registry: &DataLoaderRegistry) -> usize {
        registry
            .iter()
            .filter(|entry| self.reflect_entry(entry))
            .count()
    }

    /// Recovery hook for unrecoverable transport errors.
    ///
    /// Disconnects the loader unless it is already transitioning, then
    /// recomputes the aggregate state.
    pub fn disconnect_if_possible(
        &mut self,
        registry: &DataLoaderRegistry,
        key: &str,
    ) -> Result<Option<StateTransition>> {
        let entry = registry.entry(key)?;
        if !entry.state().is_transitioning() {
            let issued = entry.attempt_action(|loader| loader.disconnect());
            debug!(loader = %key, issued, "disconnect after error");
        }
        Ok(self.update_status(registry))
    }

    fn reflect_entry(&self, entry: &DataLoaderEntry) -> bool {
        let state = entry.state();
        if state.is_transitioning() {
            return false;
        }

        if self.active {
            if !entry.is_required() || state == ConnectionState::Connected {
                return false;
            }
            let issued = entry.attempt_action(|loader| loader.connect());
            if !issued {
                debug!(loader = %entry.key(), "connect declined by rate limiter");
            }
            issued
        } else {
            if matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::Error
            ) {
                return false;
            }
            let issued = entry.attempt_action(|loader| loader.disconnect());
            if !issued {
                debug!(loader = %entry.key(), "disconnect declined by rate limiter");
            }
            issued
        }
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
