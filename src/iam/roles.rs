//! Role allow-lists per IAM resource type.

use std::collections::BTreeSet;

use crate::error::{PolicyError, Result};
use crate::remote::Policy;

/// Roles grantable on a Vault Radar resource.
pub const RADAR_RESOURCE_ROLES: &[&str] = &[
    "roles/vault-radar.resource-viewer",
    "roles/vault-radar.resource-contributor",
];

/// Roles grantable on a project.
pub const PROJECT_ROLES: &[&str] = &[
    "roles/viewer",
    "roles/contributor",
    "roles/admin",
    "roles/vault-radar.developer",
];

/// The kind of object a policy is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IamResourceType {
    /// A Vault Radar resource (scan source, repository, ...).
    RadarResource,
    /// A project.
    Project,
}

impl IamResourceType {
    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RadarResource => "radar-resource",
            Self::Project => "project",
        }
    }

    /// Built-in roles for this resource type.
    #[must_use]
    pub const fn default_roles(self) -> &'static [&'static str] {
        match self {
            Self::RadarResource => RADAR_RESOURCE_ROLES,
            Self::Project => PROJECT_ROLES,
        }
    }
}

impl std::fmt::Display for IamResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The roles a policy on one resource type may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAllowList {
    resource_type: IamResourceType,
    roles: BTreeSet<String>,
}

impl RoleAllowList {
    /// Built-in allow-list for a resource type.
    #[must_use]
    pub fn for_resource_type(resource_type: IamResourceType) -> Self {
        Self {
            resource_type,
            roles: resource_type
                .default_roles()
                .iter()
                .map(|r| (*r).to_string())
                .collect(),
        }
    }

    /// Adds extra roles, typically from provider configuration.
    #[must_use]
    pub fn with_extra_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Resource type the list applies to.
    #[must_use]
    pub const fn resource_type(&self) -> IamResourceType {
        self.resource_type
    }

    /// Returns true if the role is allowed.
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Allowed roles, sorted.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Checks every binding of `policy`, reporting all offending roles at once.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRoles`] listing each disallowed role once,
    /// in order of first appearance.
    pub fn validate(&self, resource_name: &str, policy: &Policy) -> Result<()> {
        let mut invalid: Vec<String> = Vec::new();
        for binding in &policy.bindings {
            if !self.contains(&binding.role) && !invalid.contains(&binding.role) {
                invalid.push(binding.role.clone());
            }
        }

        if invalid.is_empty() {
            return Ok(());
        }

        Err(PolicyError::InvalidRoles {
            resource_name: resource_name.to_string(),
            roles: invalid,
            allowed: self.roles().map(str::to_string).collect(),
        }
        .into())
    }
}
