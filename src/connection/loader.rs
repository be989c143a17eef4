//! Boundary to the transport collaborator.

use crate::types::{AreaOfInterestAction, ChannelAddress, ConnectionState, Filter};
use serde::{Deserialize, Serialize};

/// One transport / channel-system connection.
///
/// Every request is fire-and-forget: the transport queues it and later
/// reports the outcome through a [`TransportEvent`] or the matching
/// `on_*` callback on the context.
pub trait DataLoader: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn connect(&self);

    fn disconnect(&self);

    fn request_subscribe(&self, address: ChannelAddress, filter: Option<Filter>);

    fn request_subscription_update(&self, address: ChannelAddress, filter: Option<Filter>);

    fn request_unsubscribe(&self, address: ChannelAddress);

    /// Position of a matching request in the outbound queue, if any.
    ///
    /// Matching on `Add` and `Update` considers the filter; `Remove` matches on
    /// address alone and is called with `filter = None`.
    fn index_of_pending_area_of_interest_action(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Option<usize>;

    fn is_area_of_interest_action_pending(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> bool {
        self.index_of_pending_area_of_interest_action(action, address, filter)
            .is_some()
    }

    /// No requests queued or in flight.
    fn is_idle(&self) -> bool;
}

/// Callbacks a transport delivers from its own thread.
///
/// Sent through [`crate::ReplicantContext::event_sender`] and dispatched on the
/// owning thread by [`crate::ReplicantContext::process_transport_events`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    ConnectionStateChanged {
        loader: String,
    },
    SubscribeStarted {
        address: ChannelAddress,
    },
    SubscribeCompleted {
        address: ChannelAddress,
        /// Filter the server confirmed.
        filter: Option<Filter>,
    },
    SubscribeFailed {
        address: ChannelAddress,
        error: String,
    },
    UnsubscribeStarted {
        address: ChannelAddress,
    },
    UnsubscribeCompleted {
        address: ChannelAddress,
    },
    UnsubscribeFailed {
        address: ChannelAddress,
        error: String,
    },
    SubscriptionUpdateStarted {
        address: ChannelAddress,
    },
    SubscriptionUpdateCompleted {
        address: ChannelAddress,
        filter: Option<Filter>,
    },
    SubscriptionUpdateFailed {
        address: ChannelAddress,
        error: String,
    },
}
