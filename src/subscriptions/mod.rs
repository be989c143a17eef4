//! Subscription graph with reference counting.
//!
//! A subscription exists only after the transport confirmed it. Each one
//! tracks the edges held on it (by areas of interest, by subscriptions that
//! require it, or by application code) and the edges it holds on the
//! subscriptions it requires. A subscription left with no incoming edges is
//! orphaned and must be unsubscribed.
//!
//! Teardown is explicit: once a removal is confirmed, `delete` releases the
//! subscription's outward edges and only then marks it inactive.

mod graph;
mod types;

pub use graph::SubscriptionGraph;
pub use types::{ReferenceHolder, Subscription, SubscriptionReference};
