//! Change notifications for observers of the runtime.
//!
//! Every mutation of the area of interest set, the subscription graph, or the
//! aggregate connection state is published as a [`RuntimeEvent`]. Listeners
//! receive events over bounded channels and are dropped if they fall behind.
//!
//! # Example
//!
//! ```ignore
//! let handle = context.subscribe_events(ListenerConfig::default());
//!
//! for event in handle.drain() {
//!     if let RuntimeEvent::ConvergeComplete = event {
//!         println!("converged");
//!     }
//! }
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{
    DropReason, EventFilter, ListenerConfig, ListenerHandle, ListenerId, RuntimeEvent,
};
