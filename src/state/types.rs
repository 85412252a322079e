//! State types for one managed resource.
//!
//! These types represent the desired (plan-supplied) and observed (remote)
//! state of a single resource instance, used for reconciliation and drift
//! detection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ReconcileError, Result};
use crate::remote::RemoteResource;

use super::features::FeatureSet;
use super::field::Field;
use super::kind::ResourceKind;

/// The project a resource lives in. Immutable once the resource exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectScope(String);

impl ProjectScope {
    /// Wraps a project identifier.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self(project_id.into())
    }

    /// The project identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Plan-time resolution. An unknown project stays unknown so the provider
    /// default is not applied before the real value is available.
    #[must_use]
    pub fn plan(desired: &Field<String>, default: Option<&str>) -> Field<String> {
        match desired {
            Field::Unknown => Field::Unknown,
            Field::Value(v) => Field::Value(v.clone()),
            Field::Null => default.map(str::to_string).into(),
        }
    }

    /// Apply-time resolution: an explicit value wins over the provider default.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is still unknown, or if it is null and no
    /// provider default is configured.
    pub fn resolve(kind: ResourceKind, desired: &Field<String>, default: Option<&str>) -> Result<Self> {
        match desired {
            Field::Value(v) => Ok(Self::new(v.clone())),
            Field::Unknown => Err(ReconcileError::MissingField {
                kind: kind.to_string(),
                field: String::from("project_id"),
            }
            .into()),
            Field::Null => default.map(Self::new).ok_or_else(|| {
                ConfigError::MissingProjectId {
                    kind: kind.to_string(),
                }
                .into()
            }),
        }
    }
}

impl std::fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized auth material. Opaque to the engine and never logged.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuthBlob(String);

impl AuthBlob {
    /// Serializes a JSON document into a blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self(serde_json::to_string(value)?))
    }

    /// The serialized payload, for the transport layer only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthBlob(<redacted>)")
    }
}

/// Identity of one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
    kind: ResourceKind,
    external_id: String,
    project_scope: ProjectScope,
    #[serde(default)]
    deleted: bool,
}

impl ResourceInstance {
    /// Creates the identity of an existing remote object.
    ///
    /// # Errors
    ///
    /// Returns an error if `external_id` is empty.
    pub fn new(
        kind: ResourceKind,
        project_scope: ProjectScope,
        external_id: impl Into<String>,
    ) -> Result<Self> {
        let external_id = external_id.into();
        if external_id.is_empty() {
            return Err(ReconcileError::MissingField {
                kind: kind.to_string(),
                field: String::from("external_id"),
            }
            .into());
        }

        Ok(Self {
            kind,
            external_id,
            project_scope,
            deleted: false,
        })
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Identifier assigned by the remote system.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Project the object lives in.
    #[must_use]
    pub const fn project_scope(&self) -> &ProjectScope {
        &self.project_scope
    }

    /// Whether the remote system has marked the object for deletion.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns a copy with the observed soft-delete marker.
    #[must_use]
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }
}

/// User-declared attributes of one resource, as supplied by the plan.
#[derive(Clone, PartialEq)]
pub struct DesiredState {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Project override; null falls back to the provider default.
    pub project_id: Field<String>,
    /// Display name; unique per project for integration kinds.
    pub name: Field<String>,
    /// Secret token.
    pub token: Field<String>,
    /// Account email for Jira-style connections.
    pub email: Field<String>,
    /// Authentication method for secret managers.
    pub auth_method: Field<String>,
    /// Endpoint of the external system.
    pub connection_url: Field<String>,
    /// Capabilities switched on for this resource.
    pub features: Field<FeatureSet>,
    /// Non-secret, kind-specific settings.
    pub details: Field<Value>,
}

impl DesiredState {
    /// Creates a desired state with every attribute null.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            project_id: Field::Null,
            name: Field::Null,
            token: Field::Null,
            email: Field::Null,
            auth_method: Field::Null,
            connection_url: Field::Null,
            features: Field::Null,
            details: Field::Null,
        }
    }

    /// Sets the project.
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Field::Value(project_id.into());
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Field::Value(name.into());
        self
    }

    /// Sets the token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Field::Value(token.into());
        self
    }

    /// Sets the account email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Field::Value(email.into());
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth_method(mut self, method: impl Into<String>) -> Self {
        self.auth_method = Field::Value(method.into());
        self
    }

    /// Sets the connection URL.
    #[must_use]
    pub fn with_connection_url(mut self, url: impl Into<String>) -> Self {
        self.connection_url = Field::Value(url.into());
        self
    }

    /// Sets the feature set.
    #[must_use]
    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = Field::Value(features);
        self
    }

    /// Sets the kind-specific details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Field::Value(details);
        self
    }
}

impl std::fmt::Debug for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match &self.token {
            Field::Unknown => "<unknown>",
            Field::Null => "<null>",
            Field::Value(_) => "<redacted>",
        };
        f.debug_struct("DesiredState")
            .field("kind", &self.kind)
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("token", &token)
            .field("email", &self.email)
            .field("auth_method", &self.auth_method)
            .field("connection_url", &self.connection_url)
            .field("features", &self.features)
            .field("details", &self.details)
            .finish()
    }
}

/// Attributes of one resource as last observed (or last written).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    /// Identity of the remote object.
    pub instance: ResourceInstance,
    /// Display name.
    pub name: Option<String>,
    /// Authentication method.
    pub auth_method: Option<String>,
    /// Endpoint of the external system.
    pub connection_url: Option<String>,
    /// Capabilities switched on.
    pub features: FeatureSet,
    /// Non-secret, kind-specific settings.
    pub details: Option<Value>,
    /// Fingerprint of the last auth payload written. Held locally: reads
    /// never return auth material.
    pub auth_fingerprint: Option<String>,
}

impl ObservedState {
    /// Builds observed state from a remote read. Sensitive fields are left empty.
    #[must_use]
    pub fn from_remote(instance: ResourceInstance, remote: &RemoteResource) -> Self {
        Self {
            instance: instance.with_deleted(remote.deleted),
            name: remote.name.clone(),
            auth_method: remote.auth_method.clone(),
            connection_url: remote.connection_url.clone(),
            features: FeatureSet::from_map(&remote.features),
            details: remote.details.clone(),
            auth_fingerprint: None,
        }
    }

    /// Carries locally-held sensitive state over from a prior observation.
    #[must_use]
    pub fn carry_sensitive_from(mut self, prior: &Self) -> Self {
        self.auth_fingerprint.clone_from(&prior.auth_fingerprint);
        self
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.instance.kind()
    }
}
