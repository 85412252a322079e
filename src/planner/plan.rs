//! Update plan types and construction.
//!
//! This module converts a drift result into the ordered list of remote
//! writes an update issues.

use super::diff::{AuthChange, DiffDetail, FeatureChange, UpdateDiff};
use crate::state::ResourceKind;

/// Ordered remote writes for one update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    /// Resource kind.
    pub kind: ResourceKind,
    /// External identifier.
    pub external_id: String,
    /// Planned calls in execution order.
    pub actions: Vec<PlannedCall>,
    /// What changed, for display. Auth shows fingerprints only.
    pub details: Vec<DiffDetail>,
}

/// A single planned remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedCall {
    /// Replace the auth material.
    UpdateAuth(AuthChange),
    /// Send an explicit-null feature payload.
    UpdateFeatures(FeatureChange),
}

/// Types of planned calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// `update_auth`.
    UpdateAuth,
    /// `update_features`.
    UpdateFeatures,
}

impl UpdatePlan {
    /// Creates a plan from a diff. Auth goes first, then features.
    #[must_use]
    pub fn from_diff(diff: UpdateDiff) -> Self {
        let mut actions = Vec::with_capacity(diff.write_count());

        if let Some(auth) = diff.auth {
            actions.push(PlannedCall::UpdateAuth(auth));
        }
        if let Some(features) = diff.features {
            actions.push(PlannedCall::UpdateFeatures(features));
        }

        Self {
            kind: diff.kind,
            external_id: diff.external_id,
            actions,
            details: diff.details,
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }
}

impl PlannedCall {
    /// Type of this call.
    #[must_use]
    pub const fn call_type(&self) -> CallType {
        match self {
            Self::UpdateAuth(_) => CallType::UpdateAuth,
            Self::UpdateFeatures(_) => CallType::UpdateFeatures,
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UpdateAuth => "update-auth",
            Self::UpdateFeatures => "update-features",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateAuth(_) => write!(f, "{}", self.call_type()),
            Self::UpdateFeatures(change) => {
                write!(f, "{} {}", self.call_type(), change.payload)
            }
        }
    }
}

impl std::fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required for {} {}", self.kind, self.external_id);
        }

        writeln!(
            f,
            "Update plan for {} {} ({} calls):",
            self.kind,
            self.external_id,
            self.actions.len()
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        for detail in &self.details {
            writeln!(
                f,
                "  ~ {}: {} -> {}",
                detail.field,
                detail.old_value.as_deref().unwrap_or("none"),
                detail.new_value.as_deref().unwrap_or("none"),
            )?;
        }

        Ok(())
    }
}
