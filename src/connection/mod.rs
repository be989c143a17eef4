//! Data loaders and the aggregate connection state machine.
//!
//! Each channel system talks to the server through its own [`DataLoader`].
//! The registry wraps every loader with a rate limiter; the state machine
//! derives one runtime-wide [`ConnectionState`](crate::ConnectionState) from
//! the required loaders, with precedence
//! `Error > Disconnected > Disconnecting > Connecting > Connected`.

mod loader;
mod registry;
mod state;

pub use loader::{DataLoader, TransportEvent};
pub use registry::{DataLoaderConfig, DataLoaderEntry, DataLoaderRegistry};
pub use state::{ConnectionStateMachine, StateTransition};
