//! Runtime context tying all components together.

use crate::areas::{AreaOfInterest, AreaOfInterestSet};
use crate::connection::{
    ConnectionStateMachine, DataLoader, DataLoaderConfig, DataLoaderRegistry, StateTransition,
    TransportEvent,
};
use crate::converger::Converger;
use crate::error::{ReplicantError, Result};
use crate::events::{EventBus, ListenerConfig, ListenerHandle, ListenerId, RuntimeEvent};
use crate::propagator::{ChannelPropagator, PropagationSummary};
use crate::subscriptions::{ReferenceHolder, Subscription, SubscriptionGraph, SubscriptionReference};
use crate::types::{
    AreaOfInterestAction, AreaOfInterestStatus, ChannelAddress, ConnectionState, Filter,
    FilterComparator,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context configuration.
#[derive(Clone, Debug, Default)]
pub struct ContextConfig {
    /// Equality used for every filter comparison.
    /// Default: structural equality of the filter values
    pub filter_comparator: FilterComparator,
}

/// The replication runtime.
///
/// Owns the areas of interest, the subscription graph, the data loader
/// registry and the convergence state. All mutation goes through `&mut self`:
/// one owner drives the runtime, and transports running elsewhere hand their
/// callbacks back through [`ReplicantContext::event_sender`].
pub struct ReplicantContext {
    pub(crate) config: ContextConfig,
    pub(crate) areas: AreaOfInterestSet,
    pub(crate) subscriptions: SubscriptionGraph,
    pub(crate) loaders: DataLoaderRegistry,
    pub(crate) connection: ConnectionStateMachine,
    pub(crate) converger: Converger,
    pub(crate) propagators: Vec<ChannelPropagator>,
    pub(crate) events: EventBus,
    transport_tx: Sender<TransportEvent>,
    pub(crate) transport_rx: Receiver<TransportEvent>,
}

impl ReplicantContext {
    pub fn new(config: ContextConfig) -> Self {
        let (transport_tx, transport_rx) = unbounded();
        Self {
            config,
            areas: AreaOfInterestSet::new(),
            subscriptions: SubscriptionGraph::new(),
            loaders: DataLoaderRegistry::new(),
            connection: ConnectionStateMachine::new(),
            converger: Converger::default(),
            propagators: Vec::new(),
            events: EventBus::new(),
            transport_tx,
            transport_rx,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn areas_of_interest(&self) -> &AreaOfInterestSet {
        &self.areas
    }

    pub fn subscriptions(&self) -> &SubscriptionGraph {
        &self.subscriptions
    }

    pub fn data_loaders(&self) -> &DataLoaderRegistry {
        &self.loaders
    }

    // --- Connection ---

    /// Register the loader serving `config.channel_types`.
    pub fn register_data_loader(
        &mut self,
        config: DataLoaderConfig,
        loader: Arc<dyn DataLoader>,
    ) -> Result<()> {
        info!(loader = %config.key, required = config.required, "registering data loader");
        self.loaders.register(config, loader)?;
        self.refresh_connection_status();
        self.connection.reflect_active_state(&self.loaders);
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_active(&self) -> bool {
        self.connection.is_active()
    }

    /// Ask every required loader to connect.
    pub fn activate(&mut self) {
        self.connection.activate();
        self.connection.reflect_active_state(&self.loaders);
        self.refresh_connection_status();
    }

    /// Ask every loader to disconnect.
    pub fn deactivate(&mut self) {
        self.connection.deactivate();
        self.connection.reflect_active_state(&self.loaders);
        self.refresh_connection_status();
    }

    /// A loader's state changed.
    pub fn on_connection_state_changed(&mut self, key: &str) -> Result<()> {
        let state = self.loaders.entry(key)?.state();
        debug!(loader = %key, state = ?state, "data loader state changed");

        self.refresh_connection_status();
        if self.connection.reflect_active_state(&self.loaders) > 0 {
            self.refresh_connection_status();
        }
        // Areas served by this loader may now converge
        self.mark_dirty();
        self.converge_step();
        Ok(())
    }

    /// Recovery hook for unrecoverable transport errors.
    pub fn disconnect_if_possible(&mut self, key: &str) -> Result<()> {
        let transition = self.connection.disconnect_if_possible(&self.loaders, key)?;
        if let Some(transition) = transition {
            self.on_state_transition(transition);
        }
        Ok(())
    }

    /// Connect one loader, required or not, subject to its rate limiter.
    /// Returns whether the request was issued.
    pub fn connect_data_loader(&mut self, key: &str) -> Result<bool> {
        let entry = self.loaders.entry(key)?;
        if entry.state().is_transitioning() || entry.state() == ConnectionState::Connected {
            return Ok(false);
        }
        let issued = entry.attempt_action(|loader| loader.connect());
        self.refresh_connection_status();
        Ok(issued)
    }

    /// Periodic driver: retry connects or disconnects the rate limiter
    /// declined earlier, then converge.
    pub fn tick(&mut self) {
        if self.connection.reflect_active_state(&self.loaders) > 0 {
            self.refresh_connection_status();
        }
        self.converge_step();
    }

    fn refresh_connection_status(&mut self) {
        if let Some(transition) = self.connection.update_status(&self.loaders) {
            self.on_state_transition(transition);
        }
    }

    fn on_state_transition(&mut self, transition: StateTransition) {
        self.events.publish(RuntimeEvent::ConnectionStateChanged {
            from: transition.from,
            to: transition.to,
        });
        if transition.to == ConnectionState::Connected {
            self.mark_dirty();
            self.converge_step();
        }
    }

    // --- Areas of Interest ---

    /// Declare interest in `address`.
    ///
    /// Declaring an existing address with an equal filter adds a reference;
    /// with a different filter it fails (use
    /// [`ReplicantContext::update_area_of_interest_filter`]).
    pub fn create_area_of_interest(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<()> {
        self.declare_area_of_interest(address, filter)?;
        self.converge_step();
        Ok(())
    }

    /// Drop one reference; the area of interest is disposed with the last.
    pub fn release_area_of_interest(&mut self, address: &ChannelAddress) -> Result<()> {
        self.release_area_of_interest_reference(address)?;
        self.converge_step();
        Ok(())
    }

    pub fn update_area_of_interest_filter(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<()> {
        self.areas.set_filter(address, filter)?;
        self.mark_dirty();
        self.converge_step();
        Ok(())
    }

    pub fn find_area_of_interest(&self, address: &ChannelAddress) -> Option<&AreaOfInterest> {
        self.areas.find(address)
    }

    pub fn get_area_of_interest(&self, address: &ChannelAddress) -> Result<&AreaOfInterest> {
        self.areas.get(address)
    }

    pub(crate) fn declare_area_of_interest(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<()> {
        if self.loaders.for_channel_type(address.channel_type).is_none() {
            return Err(ReplicantError::UnknownChannelType(address.channel_type));
        }

        if let Some(existing) = self.areas.find(&address) {
            if !self
                .config
                .filter_comparator
                .filters_equal(existing.filter(), filter.as_ref())
            {
                return Err(ReplicantError::AreaOfInterestExists(address));
            }
            self.areas.acquire(&address)?;
            return Ok(());
        }

        self.areas.insert(address, filter.clone())?;
        debug!(address = %address, "area of interest created");
        self.events
            .publish(RuntimeEvent::AreaOfInterestCreated { address, filter });

        // A subscription may already exist, e.g. pending removal or implicit
        let subscribed = self
            .subscriptions
            .find(&address)
            .map_or(false, |s| s.is_active());
        if subscribed {
            let reference = self
                .subscriptions
                .create_reference(&address, ReferenceHolder::AreaOfInterest(address))?;
            if let Some(area) = self.areas.find_mut(&address) {
                area.set_subscription_ref(Some(reference));
            }
        }

        self.mark_dirty();
        Ok(())
    }

    pub(crate) fn release_area_of_interest_reference(
        &mut self,
        address: &ChannelAddress,
    ) -> Result<()> {
        if let Some(area) = self.areas.release(address)? {
            self.on_area_of_interest_disposed(area);
        }
        Ok(())
    }

    /// Dispose regardless of outstanding references. No-op if already gone.
    pub(crate) fn dispose_area_of_interest(&mut self, address: &ChannelAddress) {
        if let Some(area) = self.areas.dispose(address) {
            self.on_area_of_interest_disposed(area);
        }
    }

    fn on_area_of_interest_disposed(&mut self, area: AreaOfInterest) {
        let address = area.address();
        debug!(address = %address, "area of interest disposed");
        self.events
            .publish(RuntimeEvent::AreaOfInterestDisposed { address });

        if let Some(reference) = area.subscription_ref() {
            if let Some(orphan) = self.subscriptions.release(&reference) {
                self.request_removal(orphan);
            }
        }
        self.mark_dirty();
    }

    pub(crate) fn set_area_of_interest_status(
        &mut self,
        address: &ChannelAddress,
        status: AreaOfInterestStatus,
    ) {
        if self.areas.set_status(address, status) {
            self.events
                .publish(RuntimeEvent::AreaOfInterestStatusChanged {
                    address: *address,
                    status,
                });
        }
    }

    // --- Subscriptions ---

    pub fn find_subscription(&self, address: &ChannelAddress) -> Option<&Subscription> {
        self.subscriptions.find(address)
    }

    pub fn get_subscription(&self, address: &ChannelAddress) -> Result<&Subscription> {
        self.subscriptions.get(address)
    }

    /// Hold a subscription on behalf of application code.
    pub fn create_subscription_reference(
        &mut self,
        target: &ChannelAddress,
        holder_key: u64,
    ) -> Result<SubscriptionReference> {
        self.subscriptions
            .create_reference(target, ReferenceHolder::External(holder_key))
    }

    /// Release a reference. Releasing twice does nothing.
    pub fn release_subscription_reference(&mut self, reference: &SubscriptionReference) {
        if let Some(orphan) = self.subscriptions.release(reference) {
            self.request_removal(orphan);
        }
    }

    /// Record that one subscription depends on another.
    pub fn require_subscription(
        &mut self,
        from: &ChannelAddress,
        to: &ChannelAddress,
    ) -> Result<()> {
        self.subscriptions.require(from, to)
    }

    /// Record a subscription the server added because `required_by` depends
    /// on it.
    pub fn record_required_subscription(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
        required_by: &ChannelAddress,
    ) -> Result<()> {
        self.subscriptions.get(required_by)?;

        if !self.subscriptions.contains(&address) {
            self.subscriptions.create(address, filter, false)?;
            self.events.publish(RuntimeEvent::SubscriptionCreated {
                address,
                explicit: false,
            });
        }
        self.subscriptions.require(required_by, &address)
    }

    /// Ask the owning transport to unsubscribe, unless it cannot right now or
    /// a removal is already queued.
    pub(crate) fn request_removal(&self, address: ChannelAddress) {
        let entry = match self.loaders.for_channel_type(address.channel_type) {
            Some(entry) => entry,
            None => return,
        };
        if entry.state() != ConnectionState::Connected {
            debug!(address = %address, "removal deferred until loader connects");
            return;
        }
        let loader = entry.loader();
        if loader.is_area_of_interest_action_pending(AreaOfInterestAction::Remove, &address, None)
        {
            return;
        }
        debug!(address = %address, loader = %entry.key(), "requesting unsubscribe");
        loader.request_unsubscribe(address);
    }

    // --- Propagation ---

    pub fn add_propagator(&mut self, propagator: ChannelPropagator) {
        self.propagators.push(propagator);
        self.mark_dirty();
        self.converge_step();
    }

    /// Run every propagator now and converge.
    pub fn propagate_now(&mut self) -> PropagationSummary {
        let summary = self.run_propagators();
        self.converge_step();
        summary
    }

    pub(crate) fn run_propagators(&mut self) -> PropagationSummary {
        let mut propagators = std::mem::take(&mut self.propagators);
        let mut total = PropagationSummary::default();

        for propagator in propagators.iter_mut() {
            match propagator.propagate(self) {
                Ok(summary) => total += summary,
                Err(e) => warn!(error = %e, "propagation failed"),
            }
        }

        // Keep anything registered while propagating
        propagators.append(&mut self.propagators);
        self.propagators = propagators;
        total
    }

    // --- Events ---

    pub fn subscribe_events(&self, config: ListenerConfig) -> ListenerHandle {
        self.events.subscribe(config)
    }

    pub fn unsubscribe_events(&self, id: ListenerId) {
        self.events.unsubscribe(id);
    }

    /// Sender transports use to deliver callbacks from other threads.
    pub fn event_sender(&self) -> Sender<TransportEvent> {
        self.transport_tx.clone()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.converger.converge_complete = false;
    }
}

impl Default for ReplicantContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}
