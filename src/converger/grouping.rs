//! Request batching rules.

use crate::types::{AreaOfInterestAction, ChannelAddress, Filter, FilterComparator};

/// Outcome of converging one area of interest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeAction {
    /// A subscribe request was queued.
    SubmittedAdd,
    /// A filter update request was queued.
    SubmittedUpdate,
    /// A request for this address is already queued.
    InProgress,
    /// Nothing to do now.
    NoAction,
    /// The request could not join the current batch; the pass must stop.
    Terminate,
}

/// The request that opened the current batch.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupTemplate {
    pub address: ChannelAddress,
    pub filter: Option<Filter>,
}

/// Whether `candidate` may share a network round trip with `template`.
///
/// Requires the same action (a missing action matches anything), the same
/// channel type, and, unless removing, structurally equal filters.
pub fn can_group(
    comparator: &FilterComparator,
    template: &GroupTemplate,
    template_action: Option<AreaOfInterestAction>,
    candidate: &GroupTemplate,
    candidate_action: Option<AreaOfInterestAction>,
) -> bool {
    let same_action = match (template_action, candidate_action) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };

    same_action
        && template.address.channel_type == candidate.address.channel_type
        && (candidate_action == Some(AreaOfInterestAction::Remove)
            || comparator.filters_equal(template.filter.as_ref(), candidate.filter.as_ref()))
}
