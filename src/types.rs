//! Core types for the replication runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a channel type (a type-level partition of server data).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelType(pub u32);

impl fmt::Debug for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelType({})", self.0)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a subscribable channel.
///
/// Type-level channels carry no instance id; instance-level channels are
/// parameterized by one. Used as the map key for both areas of interest and
/// subscriptions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelAddress {
    pub channel_type: ChannelType,
    pub instance_id: Option<u64>,
}

impl ChannelAddress {
    /// Address of a type-level channel.
    pub fn type_level(channel_type: ChannelType) -> Self {
        Self {
            channel_type,
            instance_id: None,
        }
    }

    /// Address of an instance-level channel.
    pub fn instance(channel_type: ChannelType, instance_id: u64) -> Self {
        Self {
            channel_type,
            instance_id: Some(instance_id),
        }
    }
}

impl fmt::Debug for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelAddress({})", self)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_id {
            Some(id) => write!(f, "{}.{}", self.channel_type, id),
            None => write!(f, "{}", self.channel_type),
        }
    }
}

/// Opaque filter value attached to a channel.
///
/// The runtime never interprets a filter; it only compares filters through a
/// [`FilterComparator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter(pub serde_json::Value);

impl Filter {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Filter(value.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type FilterEqFn = dyn Fn(Option<&Filter>, Option<&Filter>) -> bool + Send + Sync;

/// Caller-supplied structural equality over filters.
///
/// The default compares the underlying JSON values structurally.
#[derive(Clone)]
pub struct FilterComparator(Arc<FilterEqFn>);

impl FilterComparator {
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(Option<&Filter>, Option<&Filter>) -> bool + Send + Sync + 'static,
    {
        FilterComparator(Arc::new(eq))
    }

    /// Compare by the stringified form of each filter.
    pub fn stringified() -> Self {
        Self::new(|a, b| a.map(|f| f.to_string()) == b.map(|f| f.to_string()))
    }

    pub fn filters_equal(&self, a: Option<&Filter>, b: Option<&Filter>) -> bool {
        (self.0)(a, b)
    }
}

impl Default for FilterComparator {
    fn default() -> Self {
        Self::new(|a, b| a == b)
    }
}

impl fmt::Debug for FilterComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FilterComparator(..)")
    }
}

/// Lifecycle status of an area of interest, annotated by transport callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaOfInterestStatus {
    NotAsked,
    Loading,
    Loaded,
    Updating,
    Updated,
    Unloading,
    Unloaded,
    LoadFailed,
    UpdateFailed,
}

impl Default for AreaOfInterestStatus {
    fn default() -> Self {
        AreaOfInterestStatus::NotAsked
    }
}

/// Kind of request queued on a transport on behalf of an area of interest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaOfInterestAction {
    Add,
    Remove,
    Update,
}

/// Connection state of a single data loader, or of the whole runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionState {
    /// True while a connect or disconnect is underway.
    pub fn is_transitioning(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }

    /// Precedence used when aggregating; higher wins.
    pub(crate) fn severity(self) -> u8 {
        match self {
            ConnectionState::Connected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Disconnecting => 2,
            ConnectionState::Disconnected => 3,
            ConnectionState::Error => 4,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}
