//! Transport callbacks.
//!
//! Every callback tolerates the area of interest or subscription having been
//! disposed while the request was in flight, and every callback re-triggers
//! convergence.

use crate::context::ReplicantContext;
use crate::connection::TransportEvent;
use crate::events::RuntimeEvent;
use crate::subscriptions::ReferenceHolder;
use crate::types::{AreaOfInterestStatus, ChannelAddress, Filter};
use tracing::{debug, warn};

impl ReplicantContext {
    pub fn on_subscribe_started(&mut self, address: ChannelAddress) {
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::Loading);
        self.retrigger();
    }

    /// The server confirmed a subscription with `filter`.
    pub fn on_subscribe_completed(&mut self, address: ChannelAddress, filter: Option<Filter>) {
        if self.subscriptions.contains(&address) {
            // Already present as a dependency of another subscription
            let _ = self.subscriptions.set_explicit(&address, true);
            self.apply_subscription_filter(&address, filter);
        } else {
            match self.subscriptions.create(address, filter, true) {
                Ok(_) => self.events.publish(RuntimeEvent::SubscriptionCreated {
                    address,
                    explicit: true,
                }),
                Err(e) => warn!(address = %address, error = %e, "subscription not recorded"),
            }
        }

        let holds_reference = self
            .areas
            .find(&address)
            .map(|area| area.subscription_ref().is_some());

        match holds_reference {
            Some(false) => {
                match self
                    .subscriptions
                    .create_reference(&address, ReferenceHolder::AreaOfInterest(address))
                {
                    Ok(reference) => {
                        if let Some(area) = self.areas.find_mut(&address) {
                            area.set_subscription_ref(Some(reference));
                        }
                    }
                    Err(e) => warn!(address = %address, error = %e, "area of interest not linked"),
                }
            }
            Some(true) => {}
            None => {
                debug!(address = %address, "subscribe completed after area of interest was disposed");
                if self
                    .subscriptions
                    .find(&address)
                    .map_or(false, |s| s.is_orphaned())
                {
                    self.request_removal(address);
                }
            }
        }

        self.set_area_of_interest_status(&address, AreaOfInterestStatus::Loaded);
        self.retrigger();
    }

    /// A failed subscribe is not retried; the area of interest is disposed
    /// and must be declared again.
    pub fn on_subscribe_failed(&mut self, address: ChannelAddress, error: &str) {
        warn!(address = %address, error, "subscribe failed");
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::LoadFailed);
        self.dispose_area_of_interest(&address);
        self.retrigger();
    }

    pub fn on_unsubscribe_started(&mut self, address: ChannelAddress) {
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::Unloading);
        self.retrigger();
    }

    pub fn on_unsubscribe_completed(&mut self, address: ChannelAddress) {
        self.remove_subscription(&address);
        self.retrigger();
    }

    /// The server may already have dropped the channel, so a failed
    /// unsubscribe is handled like a completed one.
    pub fn on_unsubscribe_failed(&mut self, address: ChannelAddress, error: &str) {
        debug!(address = %address, error, "unsubscribe failed, dropping subscription");
        self.remove_subscription(&address);
        self.retrigger();
    }

    pub fn on_subscription_update_started(&mut self, address: ChannelAddress) {
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::Updating);
        self.retrigger();
    }

    pub fn on_subscription_update_completed(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) {
        if self.subscriptions.contains(&address) {
            self.apply_subscription_filter(&address, filter);
        } else {
            debug!(address = %address, "update completed for unknown subscription");
        }
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::Updated);
        self.retrigger();
    }

    pub fn on_subscription_update_failed(&mut self, address: ChannelAddress, error: &str) {
        warn!(address = %address, error, "subscription update failed");
        self.set_area_of_interest_status(&address, AreaOfInterestStatus::UpdateFailed);
        self.dispose_area_of_interest(&address);
        self.retrigger();
    }

    /// Dispatch one transport event to its callback.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged { loader } => {
                if let Err(e) = self.on_connection_state_changed(&loader) {
                    warn!(loader = %loader, error = %e, "state change from unknown loader");
                }
            }
            TransportEvent::SubscribeStarted { address } => self.on_subscribe_started(address),
            TransportEvent::SubscribeCompleted { address, filter } => {
                self.on_subscribe_completed(address, filter)
            }
            TransportEvent::SubscribeFailed { address, error } => {
                self.on_subscribe_failed(address, &error)
            }
            TransportEvent::UnsubscribeStarted { address } => self.on_unsubscribe_started(address),
            TransportEvent::UnsubscribeCompleted { address } => {
                self.on_unsubscribe_completed(address)
            }
            TransportEvent::UnsubscribeFailed { address, error } => {
                self.on_unsubscribe_failed(address, &error)
            }
            TransportEvent::SubscriptionUpdateStarted { address } => {
                self.on_subscription_update_started(address)
            }
            TransportEvent::SubscriptionUpdateCompleted { address, filter } => {
                self.on_subscription_update_completed(address, filter)
            }
            TransportEvent::SubscriptionUpdateFailed { address, error } => {
                self.on_subscription_update_failed(address, &error)
            }
        }
    }

    /// Drain transport events queued through [`ReplicantContext::event_sender`].
    /// Returns how many were handled.
    pub fn process_transport_events(&mut self) -> usize {
        let pending: Vec<TransportEvent> = self.transport_rx.try_iter().collect();
        let count = pending.len();
        for event in pending {
            self.handle_transport_event(event);
        }
        count
    }

    fn apply_subscription_filter(&mut self, address: &ChannelAddress, filter: Option<Filter>) {
        let unchanged = self.subscriptions.find(address).map_or(true, |s| {
            self.config
                .filter_comparator
                .filters_equal(s.filter(), filter.as_ref())
        });
        if unchanged {
            return;
        }
        if self.subscriptions.set_filter(address, filter.clone()).is_ok() {
            self.events.publish(RuntimeEvent::SubscriptionFilterChanged {
                address: *address,
                filter,
            });
        }
    }

    /// Drop a subscription whose removal the transport confirmed.
    fn remove_subscription(&mut self, address: &ChannelAddress) {
        let orphans = match self.subscriptions.delete(address) {
            Ok(orphans) => orphans,
            Err(_) => {
                debug!(address = %address, "unsubscribe for unknown subscription");
                return;
            }
        };
        self.events
            .publish(RuntimeEvent::SubscriptionDeleted { address: *address });

        // The area of interest's edge died with the subscription
        if let Some(area) = self.areas.find_mut(address) {
            area.set_subscription_ref(None);
        }
        self.set_area_of_interest_status(address, AreaOfInterestStatus::Unloaded);

        for orphan in orphans {
            self.request_removal(orphan);
        }
    }

    fn retrigger(&mut self) {
        self.mark_dirty();
        self.converge_step();
    }
}
