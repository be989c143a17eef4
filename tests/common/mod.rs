//! Shared test transport.

#![allow(dead_code)]

use parking_lot::Mutex;
use replicant::{
    AreaOfInterestAction, ChannelAddress, ChannelType, ConnectionState, DataLoader,
    DataLoaderConfig, Filter, RateLimitConfig, ReplicantContext,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A request as the transport received it.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub action: AreaOfInterestAction,
    pub address: ChannelAddress,
    pub filter: Option<Filter>,
}

impl Request {
    pub fn add(address: ChannelAddress, filter: Option<Filter>) -> Self {
        Self {
            action: AreaOfInterestAction::Add,
            address,
            filter,
        }
    }

    pub fn update(address: ChannelAddress, filter: Option<Filter>) -> Self {
        Self {
            action: AreaOfInterestAction::Update,
            address,
            filter,
        }
    }

    pub fn remove(address: ChannelAddress) -> Self {
        Self {
            action: AreaOfInterestAction::Remove,
            address,
            filter: None,
        }
    }
}

/// In-memory transport with a FIFO outbound queue.
///
/// Requests stay queued (and so count as pending) until the test completes or
/// fails them.
pub struct MockDataLoader {
    key: String,
    state: Mutex<ConnectionState>,
    queue: Mutex<VecDeque<Request>>,
    log: Mutex<Vec<Request>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockDataLoader {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            state: Mutex::new(ConnectionState::Disconnected),
            queue: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Move to `state` and tell the context.
    pub fn transition(&self, context: &mut ReplicantContext, state: ConnectionState) {
        self.set_state(state);
        context.on_connection_state_changed(&self.key).unwrap();
    }

    /// Every request ever received, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().clone()
    }

    /// Requests received since the last call.
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn pending(&self) -> Vec<Request> {
        self.queue.lock().iter().cloned().collect()
    }

    pub fn pop_pending(&self) -> Option<Request> {
        self.queue.lock().pop_front()
    }

    /// Complete the request at the head of the queue.
    pub fn complete_next(&self, context: &mut ReplicantContext) -> Option<Request> {
        let request = self.queue.lock().front().cloned()?;
        self.deliver_started(context, &request);
        self.queue.lock().pop_front();

        match request.action {
            AreaOfInterestAction::Add => {
                context.on_subscribe_completed(request.address, request.filter.clone())
            }
            AreaOfInterestAction::Update => {
                context.on_subscription_update_completed(request.address, request.filter.clone())
            }
            AreaOfInterestAction::Remove => context.on_unsubscribe_completed(request.address),
        }
        Some(request)
    }

    /// Fail the request at the head of the queue.
    pub fn fail_next(&self, context: &mut ReplicantContext, error: &str) -> Option<Request> {
        let request = self.queue.lock().front().cloned()?;
        self.deliver_started(context, &request);
        self.queue.lock().pop_front();

        match request.action {
            AreaOfInterestAction::Add => context.on_subscribe_failed(request.address, error),
            AreaOfInterestAction::Update => {
                context.on_subscription_update_failed(request.address, error)
            }
            AreaOfInterestAction::Remove => context.on_unsubscribe_failed(request.address, error),
        }
        Some(request)
    }

    /// Complete requests until the queue is empty. Returns how many ran.
    pub fn complete_all(&self, context: &mut ReplicantContext) -> usize {
        let mut completed = 0;
        while self.complete_next(context).is_some() {
            completed += 1;
            assert!(completed < 10_000, "transport never drained");
        }
        completed
    }

    fn deliver_started(&self, context: &mut ReplicantContext, request: &Request) {
        match request.action {
            AreaOfInterestAction::Add => context.on_subscribe_started(request.address),
            AreaOfInterestAction::Update => context.on_subscription_update_started(request.address),
            AreaOfInterestAction::Remove => context.on_unsubscribe_started(request.address),
        }
    }

    fn enqueue(&self, request: Request) {
        self.log.lock().push(request.clone());
        self.queue.lock().push_back(request);
    }
}

impl DataLoader for MockDataLoader {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnecting);
    }

    fn request_subscribe(&self, address: ChannelAddress, filter: Option<Filter>) {
        self.enqueue(Request::add(address, filter));
    }

    fn request_subscription_update(&self, address: ChannelAddress, filter: Option<Filter>) {
        self.enqueue(Request::update(address, filter));
    }

    fn request_unsubscribe(&self, address: ChannelAddress) {
        self.enqueue(Request::remove(address));
    }

    fn index_of_pending_area_of_interest_action(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Option<usize> {
        self.queue.lock().iter().rposition(|request| {
            request.action == action
                && request.address == *address
                && (action == AreaOfInterestAction::Remove || request.filter.as_ref() == filter)
        })
    }

    fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

pub fn addr(channel_type: u32, id: u64) -> ChannelAddress {
    ChannelAddress::instance(ChannelType(channel_type), id)
}

pub fn type_addr(channel_type: u32) -> ChannelAddress {
    ChannelAddress::type_level(ChannelType(channel_type))
}

pub fn filter(value: &str) -> Option<Filter> {
    Some(Filter::new(json!(value)))
}

pub fn loader_config(key: &str, channel_types: &[u32], required: bool) -> DataLoaderConfig {
    DataLoaderConfig {
        key: key.to_string(),
        required,
        channel_types: channel_types.iter().map(|t| ChannelType(*t)).collect(),
        rate_limit: RateLimitConfig {
            tokens_per_second: 100.0,
            max_tokens: 10.0,
        },
    }
}

/// Route runtime logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Context with one required loader serving `channel_types`, not yet active.
pub fn context_with_loader(channel_types: &[u32]) -> (ReplicantContext, Arc<MockDataLoader>) {
    init_tracing();
    let mut context = ReplicantContext::default();
    let loader = MockDataLoader::new("core");
    context
        .register_data_loader(loader_config("core", channel_types, true), loader.clone())
        .unwrap();
    (context, loader)
}

/// Context with one required loader, activated and connected.
pub fn connected_context(channel_types: &[u32]) -> (ReplicantContext, Arc<MockDataLoader>) {
    let (mut context, loader) = context_with_loader(channel_types);
    context.activate();
    loader.transition(&mut context, ConnectionState::Connected);
    assert_eq!(context.connection_state(), ConnectionState::Connected);
    (context, loader)
}
