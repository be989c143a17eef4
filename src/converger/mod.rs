//! Subscription convergence.
//!
//! The convergence loop reconciles the declared areas of interest with the
//! confirmed subscriptions. Each pass walks a snapshot of the areas of
//! interest in insertion order and, per record, either submits a subscribe,
//! submits a filter update, waits for a request already in flight, or does
//! nothing. Adjacent compatible requests are batched into one round trip; an
//! incompatible request ends the pass so the transport sees requests in
//! declaration order.
//!
//! A pass that submits nothing removes orphaned subscriptions and marks the
//! runtime converged. Any mutation or transport callback clears that mark and
//! triggers another step.

mod callbacks;
mod engine;
mod grouping;

pub use grouping::{can_group, ConvergeAction, GroupTemplate};

use crate::context::ReplicantContext;

/// Hook run around convergence with full access to the context.
pub type ConvergeHook = Box<dyn FnMut(&mut ReplicantContext) + Send>;

/// Convergence flags and hooks.
#[derive(Default)]
pub(crate) struct Converger {
    pub(crate) paused: bool,
    pub(crate) converge_complete: bool,
    /// Set while a step runs; nested triggers are folded into it.
    pub(crate) converging: bool,
    pub(crate) pre_converge_action: Option<ConvergeHook>,
    pub(crate) converge_complete_action: Option<ConvergeHook>,
}

/// How a single pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    /// Requests are outstanding; a callback will trigger the next step.
    Waiting,
    /// Nothing left to submit.
    Complete,
}
