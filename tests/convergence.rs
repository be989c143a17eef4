//! Convergence loop tests against the mock transport.

mod common;

use common::*;
use parking_lot::Mutex;
use replicant::{
    AreaOfInterestStatus, ConnectionState, ListenerConfig, ReplicantContext, ReplicantError,
    RuntimeEvent, TransportEvent,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

// --- Scenarios ---

#[test]
fn test_interest_declared_while_disconnected_subscribes_on_connect() {
    let (mut context, loader) = context_with_loader(&[1]);
    let g1 = type_addr(1);

    context.create_area_of_interest(g1, None).unwrap();
    assert!(loader.requests().is_empty());

    context.activate();
    assert!(loader.requests().is_empty());

    loader.transition(&mut context, ConnectionState::Connected);
    assert_eq!(loader.requests(), vec![Request::add(g1, None)]);
}

#[test]
fn test_filter_change_issues_single_update() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = type_addr(1);

    context.create_area_of_interest(g1, filter("X")).unwrap();
    loader.complete_all(&mut context);
    assert!(context.is_converge_complete());
    loader.take_requests();

    context
        .update_area_of_interest_filter(&g1, filter("Y"))
        .unwrap();
    context.converge_step();

    assert_eq!(loader.take_requests(), vec![Request::update(g1, filter("Y"))]);

    loader.complete_all(&mut context);
    assert!(loader.take_requests().is_empty());
    assert_eq!(
        context.find_subscription(&g1).unwrap().filter(),
        filter("Y").as_ref()
    );
    assert_eq!(
        context.find_area_of_interest(&g1).unwrap().status(),
        AreaOfInterestStatus::Updated
    );
}

#[test]
fn test_failed_subscribe_disposes_area_of_interest() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = type_addr(1);

    context.create_area_of_interest(g1, None).unwrap();
    loader.fail_next(&mut context, "denied");

    assert!(context.find_area_of_interest(&g1).is_none());
    assert!(context.find_subscription(&g1).is_none());
    assert!(context.is_converge_complete());

    // Nothing retries the failed request
    context.tick();
    assert_eq!(loader.requests(), vec![Request::add(g1, None)]);

    // Declaring again is the retry
    context.create_area_of_interest(g1, None).unwrap();
    assert_eq!(loader.requests().len(), 2);
}

#[test]
fn test_failed_update_disposes_area_of_interest() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = type_addr(1);

    context.create_area_of_interest(g1, filter("X")).unwrap();
    loader.complete_all(&mut context);
    context
        .update_area_of_interest_filter(&g1, filter("Y"))
        .unwrap();
    loader.take_requests();

    loader.fail_next(&mut context, "bad filter");

    assert!(context.find_area_of_interest(&g1).is_none());
    // The orphaned subscription is removed instead
    assert_eq!(loader.take_requests(), vec![Request::remove(g1)]);
    loader.complete_all(&mut context);
    assert!(context.find_subscription(&g1).is_none());
    assert!(context.is_idle());
}

// --- Batching ---

#[test]
fn test_batches_by_type_and_preserves_order() {
    let (mut context, loader) = connected_context(&[1, 2]);
    let (a1, a2, b1, a3) = (addr(1, 1), addr(1, 2), addr(2, 1), addr(1, 3));

    context
        .pause_and_run(|ctx| {
            ctx.create_area_of_interest(a1, None)?;
            ctx.create_area_of_interest(a2, None)?;
            ctx.create_area_of_interest(b1, None)?;
            ctx.create_area_of_interest(a3, None)
        })
        .unwrap();

    // b1 cannot join the type-1 batch, so the pass stops there
    assert_eq!(
        loader.requests(),
        vec![Request::add(a1, None), Request::add(a2, None)]
    );

    loader.complete_all(&mut context);

    assert_eq!(
        loader.requests(),
        vec![
            Request::add(a1, None),
            Request::add(a2, None),
            Request::add(b1, None),
            Request::add(a3, None),
        ]
    );
    assert!(context.is_converge_complete());
    assert_eq!(context.subscriptions().len(), 4);
}

#[test]
fn test_different_filters_are_not_batched() {
    let (mut context, loader) = connected_context(&[1]);

    context
        .pause_and_run(|ctx| {
            ctx.create_area_of_interest(addr(1, 1), filter("a"))?;
            ctx.create_area_of_interest(addr(1, 2), filter("b"))
        })
        .unwrap();

    assert_eq!(loader.requests(), vec![Request::add(addr(1, 1), filter("a"))]);
}

#[test]
fn test_in_flight_head_blocks_later_records() {
    let (mut context, loader) = connected_context(&[1]);

    context.create_area_of_interest(addr(1, 1), None).unwrap();
    context.create_area_of_interest(addr(1, 2), None).unwrap();

    assert_eq!(loader.requests(), vec![Request::add(addr(1, 1), None)]);

    loader.complete_next(&mut context);
    assert_eq!(
        loader.requests(),
        vec![Request::add(addr(1, 1), None), Request::add(addr(1, 2), None)]
    );
}

#[test]
fn test_update_outside_batch_ends_pass() {
    let (mut context, loader) = connected_context(&[1]);
    let (a1, a2, a3) = (addr(1, 1), addr(1, 2), addr(1, 3));

    context.create_area_of_interest(a1, None).unwrap();
    context.create_area_of_interest(a2, filter("a")).unwrap();
    loader.complete_all(&mut context);
    loader.take_requests();

    context.pause();
    // Server drops a1 while a2's filter changes and a3 is declared
    context.on_unsubscribe_completed(a1);
    context.update_area_of_interest_filter(&a2, filter("b")).unwrap();
    context.create_area_of_interest(a3, None).unwrap();
    context.resume();

    // a2's update cannot join the re-add batch, so nothing may pass it
    assert_eq!(loader.requests(), vec![Request::add(a1, None)]);

    loader.complete_all(&mut context);
    assert_eq!(
        loader.take_requests(),
        vec![
            Request::add(a1, None),
            Request::update(a2, filter("b")),
            Request::add(a3, None),
        ]
    );
    assert!(context.is_idle());
}

// --- Orphans and reference counting ---

#[test]
fn test_release_unsubscribes_exactly_once() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = addr(1, 1);

    context.create_area_of_interest(g1, None).unwrap();
    loader.complete_all(&mut context);
    loader.take_requests();

    context.release_area_of_interest(&g1).unwrap();
    context.tick();
    context.converge_step();

    assert_eq!(loader.take_requests(), vec![Request::remove(g1)]);
    // Still active until the server confirms
    assert!(context.find_subscription(&g1).unwrap().is_active());

    loader.complete_all(&mut context);
    assert!(context.find_subscription(&g1).is_none());
    assert!(loader.take_requests().is_empty());
    assert!(context.is_idle());
}

#[test]
fn test_shared_area_of_interest_needs_every_release() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = addr(1, 1);

    context.create_area_of_interest(g1, None).unwrap();
    context.create_area_of_interest(g1, None).unwrap();
    loader.complete_all(&mut context);
    loader.take_requests();

    context.release_area_of_interest(&g1).unwrap();
    assert!(loader.take_requests().is_empty());

    context.release_area_of_interest(&g1).unwrap();
    assert_eq!(loader.take_requests(), vec![Request::remove(g1)]);
}

#[test]
fn test_subscribe_completing_after_release_is_reclaimed() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = addr(1, 1);

    context.create_area_of_interest(g1, None).unwrap();
    context.release_area_of_interest(&g1).unwrap();
    assert_eq!(loader.take_requests(), vec![Request::add(g1, None)]);

    loader.complete_next(&mut context);

    assert_eq!(loader.take_requests(), vec![Request::remove(g1)]);
    loader.complete_all(&mut context);
    assert!(context.subscriptions().is_empty());
    assert!(context.is_idle());
}

#[test]
fn test_redeclare_while_removal_pending_resubscribes() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = addr(1, 1);

    context.create_area_of_interest(g1, None).unwrap();
    loader.complete_all(&mut context);
    loader.take_requests();

    context.release_area_of_interest(&g1).unwrap();
    context.create_area_of_interest(g1, None).unwrap();

    assert_eq!(
        loader.take_requests(),
        vec![Request::remove(g1), Request::add(g1, None)]
    );

    loader.complete_all(&mut context);

    assert!(context.find_subscription(&g1).unwrap().is_active());
    assert_eq!(
        context.find_area_of_interest(&g1).unwrap().status(),
        AreaOfInterestStatus::Loaded
    );
    assert!(loader.take_requests().is_empty());
    assert!(context.is_idle());
}

#[test]
fn test_required_subscription_released_with_requirer() {
    let (mut context, loader) = connected_context(&[1, 2]);
    let roster = addr(1, 1);
    let resource = addr(2, 7);

    context.create_area_of_interest(roster, None).unwrap();
    loader.complete_all(&mut context);
    context
        .record_required_subscription(resource, None, &roster)
        .unwrap();
    assert!(!context
        .find_subscription(&resource)
        .unwrap()
        .is_explicit_subscription());
    loader.take_requests();

    // A full pass keeps a required implicit subscription
    context.resume();
    assert!(loader.take_requests().is_empty());

    context.release_area_of_interest(&roster).unwrap();
    assert_eq!(loader.take_requests(), vec![Request::remove(roster)]);

    loader.complete_next(&mut context);
    assert_eq!(loader.take_requests(), vec![Request::remove(resource)]);

    loader.complete_all(&mut context);
    assert!(context.subscriptions().is_empty());
}

#[test]
fn test_external_reference_keeps_implicit_subscription() {
    let (mut context, loader) = connected_context(&[1, 2]);
    let roster = addr(1, 1);
    let resource = addr(2, 7);

    context.create_area_of_interest(roster, None).unwrap();
    loader.complete_all(&mut context);
    context
        .record_required_subscription(resource, None, &roster)
        .unwrap();
    let held = context.create_subscription_reference(&resource, 42).unwrap();

    context.release_area_of_interest(&roster).unwrap();
    loader.complete_all(&mut context);
    assert!(context.find_subscription(&resource).is_some());
    loader.take_requests();

    context.release_subscription_reference(&held);
    context.release_subscription_reference(&held);
    assert_eq!(loader.take_requests(), vec![Request::remove(resource)]);
}

// --- Pausing and hooks ---

#[test]
fn test_pause_defers_until_resume() {
    let (mut context, loader) = connected_context(&[1]);

    context.pause();
    context.create_area_of_interest(addr(1, 1), None).unwrap();
    assert!(loader.requests().is_empty());

    context.resume();
    assert_eq!(loader.requests(), vec![Request::add(addr(1, 1), None)]);
}

#[test]
fn test_pause_and_run_resumes_after_error() {
    let (mut context, loader) = connected_context(&[1]);

    let result: replicant::Result<()> = context.pause_and_run(|ctx| {
        ctx.create_area_of_interest(addr(1, 1), None)?;
        ctx.create_area_of_interest(addr(9, 9), None)
    });

    assert!(matches!(result, Err(ReplicantError::UnknownChannelType(_))));
    assert!(!context.is_paused());
    assert_eq!(loader.requests(), vec![Request::add(addr(1, 1), None)]);
}

#[test]
fn test_pause_and_run_converges_after_panic() {
    let (mut context, loader) = connected_context(&[1]);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        context.pause_and_run(|ctx: &mut ReplicantContext| -> replicant::Result<()> {
            ctx.create_area_of_interest(addr(1, 1), None)?;
            panic!("action failed");
        })
    }));

    assert!(outcome.is_err());
    assert!(!context.is_paused());
    assert_eq!(loader.requests(), vec![Request::add(addr(1, 1), None)]);
}

#[test]
fn test_hooks_run_around_convergence() {
    let (mut context, loader) = connected_context(&[1]);
    let log = Arc::new(Mutex::new(Vec::new()));

    let pre_log = Arc::clone(&log);
    context.set_pre_converge_action(Some(Box::new(move |_: &mut ReplicantContext| {
        pre_log.lock().push("pre")
    })));
    let done_log = Arc::clone(&log);
    context.set_converge_complete_action(Some(Box::new(move |_: &mut ReplicantContext| {
        done_log.lock().push("complete")
    })));

    context.create_area_of_interest(addr(1, 1), None).unwrap();
    assert_eq!(*log.lock(), vec!["pre"]);

    loader.complete_all(&mut context);
    assert_eq!(log.lock().last(), Some(&"complete"));
    assert!(context.is_idle());
}

#[test]
fn test_complete_hook_can_declare_more_interest() {
    let (mut context, loader) = connected_context(&[1]);

    context.set_converge_complete_action(Some(Box::new(|ctx: &mut ReplicantContext| {
        if ctx.find_area_of_interest(&addr(1, 2)).is_none() {
            ctx.create_area_of_interest(addr(1, 2), None).unwrap();
        }
    })));

    context.create_area_of_interest(addr(1, 1), None).unwrap();
    loader.complete_all(&mut context);

    assert!(context.find_subscription(&addr(1, 2)).is_some());
    assert!(context.is_converge_complete());
}

// --- Loaders and callbacks ---

#[test]
fn test_disconnected_optional_loader_takes_no_action() {
    let (mut context, core) = connected_context(&[1]);
    let extra = MockDataLoader::new("extra");
    context
        .register_data_loader(loader_config("extra", &[2], false), extra.clone())
        .unwrap();

    context.create_area_of_interest(addr(2, 1), None).unwrap();
    assert!(extra.requests().is_empty());
    assert!(core.requests().is_empty());
    assert!(context.is_converge_complete());

    assert!(context.connect_data_loader("extra").unwrap());
    extra.transition(&mut context, ConnectionState::Connected);
    assert_eq!(extra.requests(), vec![Request::add(addr(2, 1), None)]);
}

#[test]
fn test_callbacks_for_unknown_records_are_ignored() {
    let (mut context, loader) = connected_context(&[1]);

    context.on_unsubscribe_completed(addr(1, 5));
    context.on_subscription_update_failed(addr(1, 5), "gone");
    context.on_subscription_update_completed(addr(1, 5), None);
    context.on_unsubscribe_failed(addr(1, 5), "gone");

    assert!(loader.requests().is_empty());
    assert!(context.is_converge_complete());
}

#[test]
fn test_transport_events_from_another_thread() {
    let (mut context, loader) = connected_context(&[1]);
    let g1 = addr(1, 1);
    context.create_area_of_interest(g1, filter("f")).unwrap();

    // The transport dequeues the request and answers from its own thread
    let sender = context.event_sender();
    let request = loader.pop_pending().unwrap();
    thread::spawn(move || {
        sender
            .send(TransportEvent::SubscribeCompleted {
                address: request.address,
                filter: request.filter,
            })
            .unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(context.process_transport_events(), 1);
    assert_eq!(
        context.find_area_of_interest(&g1).unwrap().status(),
        AreaOfInterestStatus::Loaded
    );
    assert!(context.is_idle());
}

#[test]
fn test_events_published_for_lifecycle() {
    let (mut context, loader) = connected_context(&[1]);
    let handle = context.subscribe_events(ListenerConfig::default());
    let g1 = addr(1, 1);

    context.create_area_of_interest(g1, None).unwrap();
    loader.complete_all(&mut context);

    let events = handle.drain();
    assert_eq!(
        events.first(),
        Some(&RuntimeEvent::AreaOfInterestCreated {
            address: g1,
            filter: None
        })
    );
    assert!(events.contains(&RuntimeEvent::SubscriptionCreated {
        address: g1,
        explicit: true
    }));
    assert!(events.contains(&RuntimeEvent::AreaOfInterestStatusChanged {
        address: g1,
        status: AreaOfInterestStatus::Loaded
    }));
    assert_eq!(events.last(), Some(&RuntimeEvent::ConvergeComplete));
}
