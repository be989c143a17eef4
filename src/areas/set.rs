//! Insertion-ordered, reference-counted set of areas of interest.

use crate::error::{ReplicantError, Result};
use crate::subscriptions::SubscriptionReference;
use crate::types::{AreaOfInterestStatus, ChannelAddress, ChannelType, Filter};
use std::collections::{BTreeMap, HashMap};

/// A declared desire to be subscribed to a channel with a given filter.
#[derive(Clone, Debug)]
pub struct AreaOfInterest {
    address: ChannelAddress,
    filter: Option<Filter>,
    status: AreaOfInterestStatus,
    /// Outstanding application references; disposed at zero.
    ref_count: usize,
    /// Edge to the confirmed subscription, once one exists.
    subscription_ref: Option<SubscriptionReference>,
    /// Insertion position, fixes the convergence walk order.
    position: u64,
}

impl AreaOfInterest {
    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn status(&self) -> AreaOfInterestStatus {
        self.status
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn subscription_ref(&self) -> Option<SubscriptionReference> {
        self.subscription_ref
    }

    pub(crate) fn set_subscription_ref(&mut self, reference: Option<SubscriptionReference>) {
        self.subscription_ref = reference;
    }
}

/// Areas of interest keyed by address, walked in insertion order.
#[derive(Debug, Default)]
pub struct AreaOfInterestSet {
    by_address: HashMap<ChannelAddress, AreaOfInterest>,
    order: BTreeMap<u64, ChannelAddress>,
    next_position: u64,
}

impl AreaOfInterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record with a single reference.
    pub fn insert(&mut self, address: ChannelAddress, filter: Option<Filter>) -> Result<()> {
        if self.by_address.contains_key(&address) {
            return Err(ReplicantError::AreaOfInterestExists(address));
        }

        let position = self.next_position;
        self.next_position += 1;

        self.order.insert(position, address);
        self.by_address.insert(
            address,
            AreaOfInterest {
                address,
                filter,
                status: AreaOfInterestStatus::NotAsked,
                ref_count: 1,
                subscription_ref: None,
                position,
            },
        );
        Ok(())
    }

    /// Add an application reference. Returns the new count.
    pub fn acquire(&mut self, address: &ChannelAddress) -> Result<usize> {
        let area = self.get_mut(address)?;
        area.ref_count += 1;
        Ok(area.ref_count)
    }

    /// Drop an application reference. Returns the removed record once the
    /// last reference is gone.
    pub fn release(&mut self, address: &ChannelAddress) -> Result<Option<AreaOfInterest>> {
        let area = self.get_mut(address)?;
        area.ref_count = area.ref_count.saturating_sub(1);
        if area.ref_count > 0 {
            return Ok(None);
        }
        Ok(self.dispose(address))
    }

    /// Remove a record regardless of its reference count.
    pub fn dispose(&mut self, address: &ChannelAddress) -> Option<AreaOfInterest> {
        let area = self.by_address.remove(address)?;
        self.order.remove(&area.position);
        Some(area)
    }

    pub fn find(&self, address: &ChannelAddress) -> Option<&AreaOfInterest> {
        self.by_address.get(address)
    }

    pub fn get(&self, address: &ChannelAddress) -> Result<&AreaOfInterest> {
        self.by_address
            .get(address)
            .ok_or(ReplicantError::AreaOfInterestNotFound(*address))
    }

    pub(crate) fn get_mut(&mut self, address: &ChannelAddress) -> Result<&mut AreaOfInterest> {
        self.by_address
            .get_mut(address)
            .ok_or(ReplicantError::AreaOfInterestNotFound(*address))
    }

    pub(crate) fn find_mut(&mut self, address: &ChannelAddress) -> Option<&mut AreaOfInterest> {
        self.by_address.get_mut(address)
    }

    /// Set the status, returning true if it changed.
    pub(crate) fn set_status(
        &mut self,
        address: &ChannelAddress,
        status: AreaOfInterestStatus,
    ) -> bool {
        match self.by_address.get_mut(address) {
            Some(area) if area.status != status => {
                area.status = status;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_filter(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<()> {
        self.get_mut(address)?.filter = filter;
        Ok(())
    }

    pub fn contains(&self, address: &ChannelAddress) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Copy of the addresses in insertion order. Records may be disposed
    /// while the copy is being walked.
    pub fn snapshot(&self) -> Vec<ChannelAddress> {
        self.order.values().copied().collect()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AreaOfInterest> {
        self.order
            .values()
            .filter_map(move |address| self.by_address.get(address))
    }

    pub fn of_channel_type(&self, channel_type: ChannelType) -> Vec<&AreaOfInterest> {
        self.iter()
            .filter(|area| area.address.channel_type == channel_type)
            .collect()
    }
}
