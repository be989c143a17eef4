//! The convergence loop.

use crate::context::ReplicantContext;
use crate::error::Result;
use crate::events::RuntimeEvent;
use crate::types::{AreaOfInterestAction, ChannelAddress, ConnectionState};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

use super::grouping::{can_group, ConvergeAction, GroupTemplate};
use super::{ConvergeHook, PassOutcome};

impl ReplicantContext {
    /// Run convergence until it either waits on outstanding requests or has
    /// nothing left to do.
    ///
    /// Does nothing while paused, while the runtime is not connected, or once
    /// a pass is known complete. Calls made from inside a running step (for
    /// example from a hook) are folded into that step.
    pub fn converge_step(&mut self) {
        if self.converger.converging {
            return;
        }
        self.converger.converging = true;

        while self.can_converge() {
            self.run_propagators();
            self.run_pre_converge_action();
            if !self.can_converge() {
                break;
            }

            match self.converge_pass() {
                PassOutcome::Waiting => break,
                // The hook may have declared new interest; loop if so
                PassOutcome::Complete => self.run_converge_complete_action(),
            }
        }

        self.converger.converging = false;
    }

    pub fn is_converge_complete(&self) -> bool {
        self.converger.converge_complete
    }

    /// Converged and every transport has drained its queue.
    pub fn is_idle(&self) -> bool {
        self.converger.converge_complete && self.loaders.is_idle()
    }

    pub fn is_paused(&self) -> bool {
        self.converger.paused
    }

    pub fn pause(&mut self) {
        self.converger.paused = true;
    }

    pub fn resume(&mut self) {
        self.converger.paused = false;
        self.mark_dirty();
        self.converge_step();
    }

    /// Run `action` with convergence paused, then resume and converge once.
    ///
    /// The pause is lifted and convergence runs whether `action` returns an
    /// error or panics; a panic is resumed afterwards.
    pub fn pause_and_run<R, F>(&mut self, action: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.converger.paused = true;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(&mut *self)));
        self.converger.paused = false;
        self.mark_dirty();
        self.converge_step();

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Hook run at the start of every step, before the pass.
    pub fn set_pre_converge_action(&mut self, action: Option<ConvergeHook>) {
        self.converger.pre_converge_action = action;
    }

    /// Hook run whenever a pass completes.
    pub fn set_converge_complete_action(&mut self, action: Option<ConvergeHook>) {
        self.converger.converge_complete_action = action;
    }

    fn can_converge(&self) -> bool {
        !self.converger.paused
            && !self.converger.converge_complete
            && self.connection.state() == ConnectionState::Connected
    }

    fn run_pre_converge_action(&mut self) {
        if let Some(mut action) = self.converger.pre_converge_action.take() {
            action(self);
            // Keep a replacement installed by the hook itself
            if self.converger.pre_converge_action.is_none() {
                self.converger.pre_converge_action = Some(action);
            }
        }
    }

    fn run_converge_complete_action(&mut self) {
        if let Some(mut action) = self.converger.converge_complete_action.take() {
            action(self);
            if self.converger.converge_complete_action.is_none() {
                self.converger.converge_complete_action = Some(action);
            }
        }
    }

    /// One walk over the areas of interest.
    fn converge_pass(&mut self) -> PassOutcome {
        let snapshot = self.areas.snapshot();
        let mut expected = HashSet::with_capacity(snapshot.len());
        let mut template: Option<GroupTemplate> = None;
        let mut group_action: Option<AreaOfInterestAction> = None;

        for address in snapshot {
            // Disposed since the snapshot was taken
            let candidate = match self.areas.find(&address) {
                Some(area) => GroupTemplate {
                    address,
                    filter: area.filter().cloned(),
                },
                None => continue,
            };
            expected.insert(address);

            match self.converge_area_of_interest(&candidate, template.as_ref(), group_action) {
                ConvergeAction::Terminate => return PassOutcome::Waiting,
                ConvergeAction::InProgress => {
                    // Nothing may overtake a request in flight at the head
                    if template.is_none() {
                        return PassOutcome::Waiting;
                    }
                }
                ConvergeAction::SubmittedAdd => {
                    template = Some(candidate);
                    group_action = Some(AreaOfInterestAction::Add);
                }
                ConvergeAction::SubmittedUpdate => {
                    template = Some(candidate);
                    group_action = Some(AreaOfInterestAction::Update);
                }
                ConvergeAction::NoAction => {}
            }
        }

        if template.is_some() {
            // Wait for the batch to complete
            return PassOutcome::Waiting;
        }

        self.remove_orphan_subscriptions(&expected);
        self.converger.converge_complete = true;
        info!(
            areas_of_interest = self.areas.len(),
            subscriptions = self.subscriptions.len(),
            "convergence complete"
        );
        self.events.publish(RuntimeEvent::ConvergeComplete);
        PassOutcome::Complete
    }

    /// Decide and submit the request, if any, for one area of interest.
    pub(crate) fn converge_area_of_interest(
        &self,
        candidate: &GroupTemplate,
        template: Option<&GroupTemplate>,
        group_action: Option<AreaOfInterestAction>,
    ) -> ConvergeAction {
        let address = candidate.address;
        let entry = match self.loaders.for_channel_type(address.channel_type) {
            Some(entry) if entry.state() == ConnectionState::Connected => entry,
            // Converges once the loader connects
            _ => return ConvergeAction::NoAction,
        };
        let loader = entry.loader();
        let comparator = &self.config.filter_comparator;

        let subscription = self.subscriptions.find(&address);
        let filter = candidate.filter.as_ref();
        let add_index = loader.index_of_pending_area_of_interest_action(
            AreaOfInterestAction::Add,
            &address,
            filter,
        );
        let remove_index = loader.index_of_pending_area_of_interest_action(
            AreaOfInterestAction::Remove,
            &address,
            None,
        );
        let update_index = loader.index_of_pending_area_of_interest_action(
            AreaOfInterestAction::Update,
            &address,
            filter,
        );

        // None orders before any Some, matching a -1 "not queued" index
        if (subscription.is_none() && add_index.is_none()) || remove_index > add_index {
            if let Some(template) = template {
                if !can_group(
                    comparator,
                    template,
                    group_action,
                    candidate,
                    Some(AreaOfInterestAction::Add),
                ) {
                    return ConvergeAction::Terminate;
                }
            }
            debug!(address = %address, loader = %entry.key(), "requesting subscribe");
            loader.request_subscribe(address, candidate.filter.clone());
            return ConvergeAction::SubmittedAdd;
        }

        if add_index.is_some() || update_index.is_some() {
            return ConvergeAction::InProgress;
        }

        if let Some(subscription) = subscription {
            if !comparator.filters_equal(subscription.filter(), filter) {
                if let Some(template) = template {
                    if !can_group(
                        comparator,
                        template,
                        group_action,
                        candidate,
                        Some(AreaOfInterestAction::Update),
                    ) {
                        return ConvergeAction::Terminate;
                    }
                }
                debug!(address = %address, loader = %entry.key(), "requesting subscription update");
                loader.request_subscription_update(address, candidate.filter.clone());
                return ConvergeAction::SubmittedUpdate;
            }
        }

        ConvergeAction::NoAction
    }

    /// Unsubscribe active subscriptions no area of interest backs: explicit
    /// ones missing from `expected`, and implicit ones nothing requires.
    fn remove_orphan_subscriptions(&mut self, expected: &HashSet<ChannelAddress>) {
        let orphans: Vec<ChannelAddress> = self
            .subscriptions
            .iter()
            .filter(|s| s.is_active() && !expected.contains(&s.address()))
            .filter(|s| s.is_explicit_subscription() || s.incoming_count() == 0)
            .map(|s| s.address())
            .collect();

        for address in orphans {
            self.request_removal(address);
        }
    }
}
