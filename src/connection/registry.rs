//! Registry of data loaders, one per channel system.

use crate::error::{ReplicantError, Result};
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::types::{ChannelType, ConnectionState};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::loader::DataLoader;

/// Cost of a single connect or disconnect attempt.
const ACTION_COST: f64 = 1.0;

/// Data loader registration settings.
#[derive(Clone, Debug)]
pub struct DataLoaderConfig {
    /// Unique key for the loader.
    pub key: String,

    /// Whether the loader must be connected for the runtime to be connected.
    /// Default: true
    pub required: bool,

    /// Channel types whose traffic goes through this loader.
    pub channel_types: Vec<ChannelType>,

    /// Throttle for connect/disconnect attempts.
    pub rate_limit: RateLimitConfig,
}

impl DataLoaderConfig {
    pub fn new(key: impl Into<String>, channel_types: Vec<ChannelType>) -> Self {
        Self {
            key: key.into(),
            channel_types,
            ..Default::default()
        }
    }
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            required: true,
            channel_types: Vec::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// A registered loader with its own rate limiter.
pub struct DataLoaderEntry {
    key: String,
    required: bool,
    channel_types: Vec<ChannelType>,
    loader: Arc<dyn DataLoader>,
    rate_limiter: RateLimiter,
}

impl DataLoaderEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn channel_types(&self) -> &[ChannelType] {
        &self.channel_types
    }

    pub fn loader(&self) -> &Arc<dyn DataLoader> {
        &self.loader
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn state(&self) -> ConnectionState {
        self.loader.state()
    }

    /// Run `action` against the loader if the rate limiter allows it.
    pub fn attempt_action<F: FnOnce(&dyn DataLoader)>(&self, action: F) -> bool {
        let loader = self.loader.as_ref();
        self.rate_limiter
            .attempt_action(ACTION_COST, || action(loader))
    }
}

impl fmt::Debug for DataLoaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderEntry")
            .field("key", &self.key)
            .field("required", &self.required)
            .field("channel_types", &self.channel_types)
            .field("state", &self.loader.state())
            .finish()
    }
}

/// Loaders by key and by the channel types they serve.
#[derive(Debug, Default)]
pub struct DataLoaderRegistry {
    entries: Vec<DataLoaderEntry>,
    by_key: HashMap<String, usize>,
    by_channel_type: HashMap<ChannelType, usize>,
}

impl DataLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: DataLoaderConfig, loader: Arc<dyn DataLoader>) -> Result<()> {
        if self.by_key.contains_key(&config.key) {
            return Err(ReplicantError::DataLoaderExists(config.key));
        }
        for channel_type in &config.channel_types {
            if let Some(&index) = self.by_channel_type.get(channel_type) {
                return Err(ReplicantError::ChannelTypeConflict {
                    channel_type: *channel_type,
                    existing: self.entries[index].key.clone(),
                });
            }
        }

        let rate_limiter = RateLimiter::from_config(&config.rate_limit)?;
        let index = self.entries.len();

        self.by_key.insert(config.key.clone(), index);
        for channel_type in &config.channel_types {
            self.by_channel_type.insert(*channel_type, index);
        }
        self.entries.push(DataLoaderEntry {
            key: config.key,
            required: config.required,
            channel_types: config.channel_types,
            loader,
            rate_limiter,
        });
        Ok(())
    }

    pub fn entry(&self, key: &str) -> Result<&DataLoaderEntry> {
        self.by_key
            .get(key)
            .map(|&index| &self.entries[index])
            .ok_or_else(|| ReplicantError::DataLoaderNotFound(key.to_string()))
    }

    /// Loader serving a channel type.
    pub fn for_channel_type(&self, channel_type: ChannelType) -> Option<&DataLoaderEntry> {
        self.by_channel_type
            .get(&channel_type)
            .map(|&index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataLoaderEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Worst state across required loaders. Connected when none are required.
    pub fn aggregate_state(&self) -> ConnectionState {
        self.entries
            .iter()
            .filter(|entry| entry.required)
            .map(|entry| entry.state())
            .max_by_key(|state| state.severity())
            .unwrap_or(ConnectionState::Connected)
    }

    pub fn is_idle(&self) -> bool {
        self.entries.iter().all(|entry| entry.loader.is_idle())
    }
}
