//! Subscription graph types.

use crate::types::{ChannelAddress, Filter};
use std::collections::HashMap;
use std::fmt;

/// Handle to a single edge from a holder to a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionReference {
    pub(crate) id: u64,
    pub(crate) target: ChannelAddress,
}

impl SubscriptionReference {
    pub fn target(&self) -> ChannelAddress {
        self.target
    }
}

/// Whoever holds a reference to a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceHolder {
    /// The area of interest that caused the subscription.
    AreaOfInterest(ChannelAddress),
    /// Another subscription that requires it.
    Subscription(ChannelAddress),
    /// Application code, identified by a caller-chosen key.
    External(u64),
}

impl fmt::Display for ReferenceHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceHolder::AreaOfInterest(address) => write!(f, "area-of-interest:{}", address),
            ReferenceHolder::Subscription(address) => write!(f, "subscription:{}", address),
            ReferenceHolder::External(key) => write!(f, "external:{}", key),
        }
    }
}

/// A confirmed subscription on a transport.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub(crate) address: ChannelAddress,
    pub(crate) filter: Option<Filter>,
    /// Created on behalf of an area of interest rather than pulled in by the
    /// server as a dependency.
    pub(crate) explicit: bool,
    pub(crate) active: bool,
    /// Subscriptions this one requires, with the edge it holds on each.
    pub(crate) outward: HashMap<ChannelAddress, SubscriptionReference>,
    /// Edges held on this subscription, by reference id.
    pub(crate) incoming: HashMap<u64, ReferenceHolder>,
}

impl Subscription {
    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_explicit_subscription(&self) -> bool {
        self.explicit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Addresses of the subscriptions this one requires.
    pub fn requires(&self) -> impl Iterator<Item = &ChannelAddress> {
        self.outward.keys()
    }

    pub fn incoming_count(&self) -> usize {
        self.incoming.len()
    }

    /// Active with nothing holding on to it.
    pub fn is_orphaned(&self) -> bool {
        self.active && self.incoming.is_empty()
    }

    pub(crate) fn is_held_by(&self, holder: &ReferenceHolder) -> bool {
        self.incoming.values().any(|h| h == holder)
    }
}
