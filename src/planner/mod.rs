//! Planning module for update operations.
//!
//! This module handles the comparison between desired and observed states,
//! generating the minimal set of remote writes for an update.

mod diff;
mod plan;

pub use diff::{AuthChange, DiffDetail, DriftEngine, FeatureChange, UpdateDiff};
pub use plan::{CallType, PlannedCall, UpdatePlan};
