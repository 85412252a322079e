//! Wire types exchanged with the control plane.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::AuthBlob;

/// Body of a create call.
///
/// Features use the omit-empty encoding: unset features are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreatePayload {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Endpoint of the external system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_url: Option<String>,
    /// Authentication method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    /// Opaque auth material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthBlob>,
    /// Feature set, omit-empty encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
    /// Non-secret, kind-specific settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A resource as returned by a read. Never carries auth material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    /// External identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted: bool,
    /// Authentication method.
    #[serde(default)]
    pub auth_method: Option<String>,
    /// Endpoint of the external system.
    #[serde(default)]
    pub connection_url: Option<String>,
    /// Features as held by the server.
    #[serde(default)]
    pub features: Map<String, Value>,
    /// Non-secret, kind-specific settings.
    #[serde(default)]
    pub details: Option<Value>,
}

/// One role granted to a set of principals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    /// Role identifier, e.g. `roles/viewer`.
    pub role: String,
    /// Principal identifiers holding the role.
    #[serde(default)]
    pub principals: Vec<String>,
}

/// An IAM policy on one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Optimistic-concurrency token. Empty for a resource with no policy yet.
    #[serde(default)]
    pub etag: String,
    /// Role bindings.
    #[serde(default)]
    pub bindings: Vec<PolicyBinding>,
}

impl PolicyBinding {
    /// Creates a binding.
    #[must_use]
    pub fn new<I, S>(role: impl Into<String>, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role: role.into(),
            principals: principals.into_iter().map(Into::into).collect(),
        }
    }
}

impl Policy {
    /// Creates an empty policy (no bindings, no etag).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            etag: String::new(),
            bindings: Vec::new(),
        }
    }

    /// Returns true if the policy has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_payload_omits_unset() {
        let payload = CreatePayload {
            name: Some(String::from("src-1")),
            features: Some(json!({})),
            ..CreatePayload::default()
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "name": "src-1", "features": {} })
        );
    }

    #[test]
    fn test_remote_resource_defaults() {
        let resource: RemoteResource = serde_json::from_value(json!({ "id": "ext-1" })).unwrap();

        assert_eq!(resource.id, "ext-1");
        assert!(!resource.deleted);
        assert!(resource.features.is_empty());
    }

    #[test]
    fn test_empty_policy() {
        let policy = Policy::empty();
        assert!(policy.is_empty());
        assert!(policy.etag.is_empty());
    }
}
