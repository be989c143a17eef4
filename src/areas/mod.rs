//! Areas of interest: the application's declared desired subscriptions.
//!
//! An area of interest exists independently of whether its transport is
//! connected. The convergence loop reads the set in insertion order and
//! annotates each record's status; only the application (or a propagator)
//! creates and releases records.

mod set;

pub use set::{AreaOfInterest, AreaOfInterestSet};
