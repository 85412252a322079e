//! IAM policy reads and writes for one resource.
//!
//! The updater itself holds no lock. Callers take the lock named by
//! [`IamUpdater::get_mutex_key`] around a read-modify-write cycle;
//! [`PolicyManager`](super::PolicyManager) does this for both modes.

use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result};
use crate::remote::{Policy, PolicyApi};

use super::roles::RoleAllowList;

/// Prefix of the per-resource mutex key.
pub const MUTEX_KEY_PREFIX: &str = "radar-iam-";

/// Reads and writes the IAM policy of one resource.
pub struct IamUpdater<'a, P: PolicyApi + ?Sized> {
    /// Policy client.
    api: &'a P,
    /// Resource the policy is attached to.
    resource_name: String,
    /// Roles the policy may use.
    allow_list: RoleAllowList,
}

impl<'a, P: PolicyApi + ?Sized> IamUpdater<'a, P> {
    /// Creates an updater for `resource_name`.
    #[must_use]
    pub fn new(api: &'a P, resource_name: impl Into<String>, allow_list: RoleAllowList) -> Self {
        Self {
            api,
            resource_name: resource_name.into(),
            allow_list,
        }
    }

    /// Resource the policy is attached to.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Roles the policy may use.
    #[must_use]
    pub const fn allow_list(&self) -> &RoleAllowList {
        &self.allow_list
    }

    /// Key under which callers serialize read-modify-write cycles.
    #[must_use]
    pub fn get_mutex_key(&self) -> String {
        format!("{MUTEX_KEY_PREFIX}{}", self.resource_name)
    }

    /// Fetches the current policy. A resource without a policy yields an
    /// empty one (no bindings, empty etag).
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for a reason other than not-found.
    pub async fn get_resource_iam_policy(&self) -> Result<Policy> {
        match self.api.get_policy(&self.resource_name).await {
            Ok(policy) => {
                debug!(
                    "Read policy on {} ({} bindings)",
                    self.resource_name,
                    policy.bindings.len()
                );
                Ok(policy)
            }
            Err(e) if e.is_not_found() => {
                debug!("No policy on {} yet", self.resource_name);
                Ok(Policy::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Writes `policy` after checking every role against the allow-list.
    ///
    /// A stale etag is returned as a conflict and never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if any role is not allowed (all of them are listed),
    /// the etag is stale, or the write fails.
    pub async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<Policy> {
        self.allow_list.validate(&self.resource_name, policy)?;

        match self.api.set_policy(&self.resource_name, policy).await {
            Ok(stored) => {
                info!(
                    "Set policy on {} ({} bindings)",
                    self.resource_name,
                    stored.bindings.len()
                );
                Ok(stored)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Conflict {
                    warn!("Policy on {} changed concurrently", self.resource_name);
                }
                Err(e)
            }
        }
    }
}
