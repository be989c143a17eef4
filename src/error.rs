//! Error types for the replication runtime.

use crate::types::{ChannelAddress, ChannelType};
use thiserror::Error;

/// Main error type for runtime operations.
///
/// Every variant signals a caller invariant violation. Transport failures are
/// never surfaced here; they arrive as callbacks and are absorbed by the
/// convergence loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReplicantError {
    #[error("Area of interest not found: {0}")]
    AreaOfInterestNotFound(ChannelAddress),

    #[error("Area of interest already exists with a different filter: {0}")]
    AreaOfInterestExists(ChannelAddress),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(ChannelAddress),

    #[error("Subscription already exists: {0}")]
    SubscriptionExists(ChannelAddress),

    #[error("Subscription is inactive: {0}")]
    SubscriptionInactive(ChannelAddress),

    #[error("Subscription {from} already requires {to}")]
    DuplicateRequirement {
        from: ChannelAddress,
        to: ChannelAddress,
    },

    #[error("Reference from {holder} to {target} already exists")]
    DuplicateReference { holder: String, target: ChannelAddress },

    #[error("No data loader handles channel type {0}")]
    UnknownChannelType(ChannelType),

    #[error("Data loader not found: {0}")]
    DataLoaderNotFound(String),

    #[error("Data loader already registered: {0}")]
    DataLoaderExists(String),

    #[error("Channel type {channel_type} already handled by data loader {existing}")]
    ChannelTypeConflict {
        channel_type: ChannelType,
        existing: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, ReplicantError>;
