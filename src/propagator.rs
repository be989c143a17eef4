//! Cross-channel interest propagation.
//!
//! Derives areas of interest on a target channel type from the instances of a
//! source channel type that are currently subscribed, e.g. "every resource
//! referenced by my subscribed rosters". The expected set is recomputed from
//! scratch on every run and diffed against what the propagator holds, so the
//! two never drift apart.

use crate::context::ReplicantContext;
use crate::error::Result;
use crate::types::{ChannelAddress, ChannelType, Filter};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::AddAssign;
use tracing::{debug, warn};

type Resolver = Box<dyn Fn(u64) -> Vec<u64> + Send>;

/// Counts from one propagation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    pub created: usize,
    pub released: usize,
    pub kept: usize,
}

impl AddAssign for PropagationSummary {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.released += other.released;
        self.kept += other.kept;
    }
}

/// Keeps target-type areas of interest in line with subscribed source ids.
pub struct ChannelPropagator {
    source: ChannelType,
    target: ChannelType,
    filter: Option<Filter>,
    resolver: Resolver,
    /// Target areas of interest this propagator holds a reference on.
    held: HashSet<ChannelAddress>,
}

impl ChannelPropagator {
    /// `resolver` maps a subscribed source instance id to the target
    /// instance ids it needs.
    pub fn new<F>(source: ChannelType, target: ChannelType, resolver: F) -> Self
    where
        F: Fn(u64) -> Vec<u64> + Send + 'static,
    {
        Self {
            source,
            target,
            filter: None,
            resolver: Box::new(resolver),
            held: HashSet::new(),
        }
    }

    /// Filter applied to every target area of interest.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn source(&self) -> ChannelType {
        self.source
    }

    pub fn target(&self) -> ChannelType {
        self.target
    }

    pub fn held(&self) -> impl Iterator<Item = &ChannelAddress> {
        self.held.iter()
    }

    /// Reconcile the target areas of interest with the current subscriptions.
    pub fn propagate(&mut self, context: &mut ReplicantContext) -> Result<PropagationSummary> {
        let expected: BTreeSet<ChannelAddress> = context
            .subscriptions
            .subscribed_instance_ids(self.source)
            .into_iter()
            .flat_map(|id| (self.resolver)(id))
            .map(|id| ChannelAddress::instance(self.target, id))
            .collect();

        // Held records disposed elsewhere (e.g. a failed subscribe) are gone
        self.held.retain(|address| context.areas.contains(address));

        let mut existing: HashMap<ChannelAddress, Option<Filter>> = self
            .held
            .iter()
            .filter_map(|address| {
                context
                    .areas
                    .find(address)
                    .map(|area| (*address, area.filter().cloned()))
            })
            .collect();

        let mut summary = PropagationSummary::default();
        let mut missing = Vec::new();

        for address in &expected {
            let matched = existing.get(address).map_or(false, |filter| {
                context
                    .config
                    .filter_comparator
                    .filters_equal(filter.as_ref(), self.filter.as_ref())
            });
            if matched {
                existing.remove(address);
                summary.kept += 1;
            } else {
                missing.push(*address);
            }
        }

        for address in existing.keys() {
            self.held.remove(address);
            context.release_area_of_interest_reference(address)?;
            summary.released += 1;
        }

        for address in missing {
            match context.declare_area_of_interest(address, self.filter.clone()) {
                Ok(()) => {
                    self.held.insert(address);
                    summary.created += 1;
                }
                Err(e) => warn!(address = %address, error = %e, "cannot propagate interest"),
            }
        }

        if summary.created > 0 || summary.released > 0 {
            debug!(
                source = %self.source,
                target = %self.target,
                created = summary.created,
                released = summary.released,
                "propagated areas of interest"
            );
        }
        Ok(summary)
    }
}

impl fmt::Debug for ChannelPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPropagator")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("filter", &self.filter)
            .field("held", &self.held.len())
            .finish()
    }
}
