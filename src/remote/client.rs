//! Remote Resource Client seams.
//!
//! The HTTP transport lives outside this crate. The engine only talks to these
//! two traits, which report a missing object as [`RemoteError::NotFound`] and
//! a stale policy etag as [`RemoteError::Conflict`].
//!
//! [`RemoteError::NotFound`]: crate::error::RemoteError::NotFound
//! [`RemoteError::Conflict`]: crate::error::RemoteError::Conflict

use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::state::{AuthBlob, ProjectScope, ResourceKind};

use super::types::{CreatePayload, Policy, RemoteResource};

/// Typed calls against the control plane for one resource family.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Creates an object and returns its external identifier.
    async fn create(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        payload: &CreatePayload,
    ) -> Result<String>;

    /// Reads an object by external identifier.
    async fn get_by_id(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
    ) -> Result<RemoteResource>;

    /// Reads an object by name. Only meaningful for name-unique kinds.
    async fn get_by_name(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        name: &str,
    ) -> Result<RemoteResource>;

    /// Replaces the auth material of an object.
    async fn update_auth(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
        auth: &AuthBlob,
    ) -> Result<()>;

    /// Updates features. The payload is explicit-null encoded.
    async fn update_features(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
        features: &Value,
    ) -> Result<()>;

    /// Requests deletion. The object is marked deleted and offboarded asynchronously.
    async fn soft_delete(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
    ) -> Result<()>;
}

/// IAM policy calls for resources that carry a policy.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Reads the current policy.
    async fn get_policy(&self, resource_name: &str) -> Result<Policy>;

    /// Writes a whole policy. The etag must be the one last read.
    async fn set_policy(&self, resource_name: &str, policy: &Policy) -> Result<Policy>;
}
