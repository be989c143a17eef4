//! Reference-counted graph of active subscriptions.

use crate::error::{ReplicantError, Result};
use crate::types::{ChannelAddress, ChannelType, Filter};
use std::collections::HashMap;
use tracing::debug;

use super::types::{ReferenceHolder, Subscription, SubscriptionReference};

#[derive(Clone, Copy, Debug)]
struct ReferenceEntry {
    holder: ReferenceHolder,
    target: ChannelAddress,
}

/// All active subscriptions plus the reference edges between them.
///
/// Operations that can orphan a subscription return the orphaned addresses;
/// the caller is responsible for requesting their removal on the transport.
#[derive(Debug, Default)]
pub struct SubscriptionGraph {
    subscriptions: HashMap<ChannelAddress, Subscription>,
    references: HashMap<u64, ReferenceEntry>,
    next_reference_id: u64,
}

impl SubscriptionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed subscription. It starts with no incoming references.
    pub fn create(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
        explicit: bool,
    ) -> Result<&Subscription> {
        if self.subscriptions.contains_key(&address) {
            return Err(ReplicantError::SubscriptionExists(address));
        }

        debug!(address = %address, explicit, "subscription created");
        let subscription = self.subscriptions.entry(address).or_insert(Subscription {
            address,
            filter,
            explicit,
            active: true,
            outward: HashMap::new(),
            incoming: HashMap::new(),
        });
        Ok(&*subscription)
    }

    pub fn find(&self, address: &ChannelAddress) -> Option<&Subscription> {
        self.subscriptions.get(address)
    }

    pub fn get(&self, address: &ChannelAddress) -> Result<&Subscription> {
        self.subscriptions
            .get(address)
            .ok_or(ReplicantError::SubscriptionNotFound(*address))
    }

    pub fn contains(&self, address: &ChannelAddress) -> bool {
        self.subscriptions.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn addresses(&self) -> Vec<ChannelAddress> {
        self.subscriptions.keys().copied().collect()
    }

    /// Instance ids of every active subscription of the given channel type.
    pub fn subscribed_instance_ids(&self, channel_type: ChannelType) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .subscriptions
            .values()
            .filter(|s| s.active && s.address.channel_type == channel_type)
            .filter_map(|s| s.address.instance_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn set_filter(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<()> {
        self.get_mut(address)?.filter = filter;
        Ok(())
    }

    pub(crate) fn set_explicit(&mut self, address: &ChannelAddress, explicit: bool) -> Result<()> {
        self.get_mut(address)?.explicit = explicit;
        Ok(())
    }

    /// Add an edge from `holder` to the subscription at `target`.
    pub fn create_reference(
        &mut self,
        target: &ChannelAddress,
        holder: ReferenceHolder,
    ) -> Result<SubscriptionReference> {
        let id = self.next_reference_id;
        let subscription = self.get_mut(target)?;

        if !subscription.active {
            return Err(ReplicantError::SubscriptionInactive(*target));
        }
        if subscription.is_held_by(&holder) {
            return Err(ReplicantError::DuplicateReference {
                holder: holder.to_string(),
                target: *target,
            });
        }

        subscription.incoming.insert(id, holder);
        self.next_reference_id += 1;
        self.references.insert(
            id,
            ReferenceEntry {
                holder,
                target: *target,
            },
        );

        Ok(SubscriptionReference {
            id,
            target: *target,
        })
    }

    /// Record that `from` requires `to`. Requiring the same subscription twice
    /// is an error.
    pub fn require(&mut self, from: &ChannelAddress, to: &ChannelAddress) -> Result<()> {
        let source = self.get(from)?;
        if !source.active {
            return Err(ReplicantError::SubscriptionInactive(*from));
        }
        if source.outward.contains_key(to) {
            return Err(ReplicantError::DuplicateRequirement {
                from: *from,
                to: *to,
            });
        }

        let reference = self.create_reference(to, ReferenceHolder::Subscription(*from))?;
        self.get_mut(from)?.outward.insert(*to, reference);
        Ok(())
    }

    /// Release an edge. Returns the target address if this left it orphaned.
    /// Releasing an already released reference does nothing.
    pub fn release(&mut self, reference: &SubscriptionReference) -> Option<ChannelAddress> {
        let entry = self.references.remove(&reference.id)?;

        if let ReferenceHolder::Subscription(holder) = entry.holder {
            if let Some(source) = self.subscriptions.get_mut(&holder) {
                source.outward.remove(&entry.target);
            }
        }

        let target = self.subscriptions.get_mut(&entry.target)?;
        target.incoming.remove(&reference.id);

        if target.is_orphaned() {
            debug!(address = %entry.target, "subscription orphaned");
            Some(entry.target)
        } else {
            None
        }
    }

    /// Tear down a subscription after its removal was confirmed.
    ///
    /// Outward references are released before the subscription is marked
    /// inactive, so dependents lose the requirement first. Returns the
    /// subscriptions orphaned by the teardown.
    pub fn delete(&mut self, address: &ChannelAddress) -> Result<Vec<ChannelAddress>> {
        let orphans = self.delink_all(address)?;
        self.mark_inactive(address)?;

        if let Some(subscription) = self.subscriptions.remove(address) {
            // Edges held on the deleted subscription die with it.
            for id in subscription.incoming.keys() {
                if let Some(entry) = self.references.remove(id) {
                    if let ReferenceHolder::Subscription(holder) = entry.holder {
                        if let Some(source) = self.subscriptions.get_mut(&holder) {
                            source.outward.remove(address);
                        }
                    }
                }
            }
        }

        debug!(address = %address, orphaned = orphans.len(), "subscription deleted");
        Ok(orphans)
    }

    fn delink_all(&mut self, address: &ChannelAddress) -> Result<Vec<ChannelAddress>> {
        let outward: Vec<SubscriptionReference> =
            self.get(address)?.outward.values().copied().collect();

        Ok(outward
            .iter()
            .filter_map(|reference| self.release(reference))
            .filter(|orphan| orphan != address)
            .collect())
    }

    pub(crate) fn mark_inactive(&mut self, address: &ChannelAddress) -> Result<()> {
        self.get_mut(address)?.active = false;
        Ok(())
    }

    fn get_mut(&mut self, address: &ChannelAddress) -> Result<&mut Subscription> {
        self.subscriptions
            .get_mut(address)
            .ok_or(ReplicantError::SubscriptionNotFound(*address))
    }
}
