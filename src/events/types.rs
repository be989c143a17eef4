//! Runtime event types.

use crate::types::{AreaOfInterestStatus, ChannelAddress, ConnectionState, Filter};
use serde::{Deserialize, Serialize};

/// Configuration for an event listener.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Max buffered events before dropping the listener.
    /// Default: 1000
    pub buffer_size: usize,

    /// Which events to deliver.
    pub filter: EventFilter,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::all(),
        }
    }
}

/// Filter criteria for listeners.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Include area of interest lifecycle events.
    pub include_areas_of_interest: bool,

    /// Include subscription lifecycle events.
    pub include_subscriptions: bool,

    /// Include connection and convergence events.
    pub include_runtime: bool,
}

impl EventFilter {
    pub fn areas_of_interest() -> Self {
        Self {
            include_areas_of_interest: true,
            ..Default::default()
        }
    }

    pub fn subscriptions() -> Self {
        Self {
            include_subscriptions: true,
            ..Default::default()
        }
    }

    pub fn runtime() -> Self {
        Self {
            include_runtime: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_areas_of_interest: true,
            include_subscriptions: true,
            include_runtime: true,
        }
    }

    pub(crate) fn matches(&self, event: &RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::AreaOfInterestCreated { .. }
            | RuntimeEvent::AreaOfInterestStatusChanged { .. }
            | RuntimeEvent::AreaOfInterestDisposed { .. } => self.include_areas_of_interest,
            RuntimeEvent::SubscriptionCreated { .. }
            | RuntimeEvent::SubscriptionFilterChanged { .. }
            | RuntimeEvent::SubscriptionDeleted { .. } => self.include_subscriptions,
            RuntimeEvent::ConnectionStateChanged { .. } | RuntimeEvent::ConvergeComplete => {
                self.include_runtime
            }
            RuntimeEvent::Dropped { .. } => true,
        }
    }
}

/// Changes to the runtime's observable state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    // --- Area of Interest Events ---
    AreaOfInterestCreated {
        address: ChannelAddress,
        filter: Option<Filter>,
    },

    AreaOfInterestStatusChanged {
        address: ChannelAddress,
        status: AreaOfInterestStatus,
    },

    AreaOfInterestDisposed {
        address: ChannelAddress,
    },

    // --- Subscription Events ---
    SubscriptionCreated {
        address: ChannelAddress,
        explicit: bool,
    },

    SubscriptionFilterChanged {
        address: ChannelAddress,
        filter: Option<Filter>,
    },

    SubscriptionDeleted {
        address: ChannelAddress,
    },

    // --- Runtime Events ---
    ConnectionStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// A convergence pass found nothing left to do.
    ConvergeComplete,

    /// Listener was dropped.
    Dropped {
        reason: DropReason,
    },
}

/// Why a listener was dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle to receive runtime events.
pub struct ListenerHandle {
    pub id: ListenerId,
    pub receiver: crossbeam_channel::Receiver<RuntimeEvent>,
}

impl ListenerHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<RuntimeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<RuntimeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<RuntimeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<RuntimeEvent> {
        self.receiver.try_iter().collect()
    }
}
