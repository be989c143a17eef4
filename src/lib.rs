//! # Replicant
//!
//! Client-side subscription convergence for replicated server channels.
//!
//! ## Core Concepts
//!
//! - **Areas of interest**: what the application wants to be subscribed to
//! - **Subscriptions**: what the server has confirmed, reference counted
//! - **Data loaders**: one transport per channel system, rate limited
//! - **Convergence**: batched requests that move the subscriptions toward the
//!   areas of interest, tolerating failure and disconnection
//!
//! ## Example
//!
//! ```ignore
//! use replicant::{ChannelAddress, ChannelType, DataLoaderConfig, ReplicantContext};
//!
//! let mut context = ReplicantContext::default();
//! context.register_data_loader(
//!     DataLoaderConfig::new("core", vec![ChannelType(1)]),
//!     transport.clone(),
//! )?;
//! context.activate();
//!
//! // Subscribes once the transport reports it is connected
//! context.create_area_of_interest(ChannelAddress::type_level(ChannelType(1)), None)?;
//!
//! // Transport callbacks, delivered on this thread
//! context.process_transport_events();
//! assert!(context.is_converge_complete());
//! ```

pub mod areas;
pub mod connection;
pub mod context;
pub mod converger;
pub mod error;
pub mod events;
pub mod limiter;
pub mod propagator;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use areas::{AreaOfInterest, AreaOfInterestSet};
pub use connection::{
    ConnectionStateMachine, DataLoader, DataLoaderConfig, DataLoaderEntry, DataLoaderRegistry,
    StateTransition, TransportEvent,
};
pub use context::{ContextConfig, ReplicantContext};
pub use converger::{can_group, ConvergeAction, ConvergeHook, GroupTemplate};
pub use error::{ReplicantError, Result};
pub use events::{
    DropReason, EventBus, EventFilter, ListenerConfig, ListenerHandle, ListenerId, RuntimeEvent,
};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use propagator::{ChannelPropagator, PropagationSummary};
pub use subscriptions::{ReferenceHolder, Subscription, SubscriptionGraph, SubscriptionReference};
pub use types::*;
