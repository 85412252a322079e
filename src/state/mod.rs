//! State model for managed resources.
//!
//! This module provides the desired/observed state types consumed by the
//! reconciler, including tri-state plan values, the per-kind capability
//! table and feature sets.

mod features;
mod field;
mod kind;
mod types;

pub use features::FeatureSet;
pub use field::Field;
pub use kind::{AuthSerializer, KindCapabilities, ResourceKind};
pub use types::{AuthBlob, DesiredState, ObservedState, ProjectScope, ResourceInstance};
