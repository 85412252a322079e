//! Provider configuration types.
//!
//! These map to the provider's YAML configuration file. Every section has
//! defaults, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::iam::{IamResourceType, RoleAllowList};
use crate::offboard::{
    DEFAULT_MAX_POLL_INTERVAL_SECS, DEFAULT_OFFBOARD_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS,
    PollSettings,
};

/// Provider-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Default project for resources that do not set one.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Organization the provider acts in.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Offboard polling.
    #[serde(default)]
    pub offboard: OffboardConfig,
    /// IAM policy handling.
    #[serde(default)]
    pub iam: IamConfig,
}

/// Offboard polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OffboardConfig {
    /// First wait between polls, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Cap on the wait between polls, in seconds.
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,
    /// Overall time allowed for offboarding, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// IAM configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IamConfig {
    /// Roles allowed in addition to the built-in ones.
    #[serde(default)]
    pub extra_roles: Vec<String>,
}

const fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_max_poll_interval() -> u64 {
    DEFAULT_MAX_POLL_INTERVAL_SECS
}

const fn default_timeout() -> u64 {
    DEFAULT_OFFBOARD_TIMEOUT_SECS
}

impl Default for OffboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_poll_interval_secs: DEFAULT_MAX_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_OFFBOARD_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Poller settings derived from the offboard section.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings {
            initial_interval: Duration::from_secs(self.offboard.poll_interval_secs),
            max_interval: Duration::from_secs(self.offboard.max_poll_interval_secs),
            timeout: Duration::from_secs(self.offboard.timeout_secs),
        }
    }

    /// Role allow-list for `resource_type`, including the configured extras.
    #[must_use]
    pub fn role_allow_list(&self, resource_type: IamResourceType) -> RoleAllowList {
        RoleAllowList::for_resource_type(resource_type)
            .with_extra_roles(self.iam.extra_roles.iter().cloned())
    }
}
