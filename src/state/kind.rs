//! Resource kinds and their capabilities.
//!
//! Every kind is served by the same reconciliation state machine. What differs
//! between kinds is data: whether in-place update exists, whether names are
//! unique, which features the server tracks, and how auth material is encoded.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ReconcileError, Result};

use super::field::Field;
use super::types::{AuthBlob, DesiredState};

/// Encodes a desired state's auth material into an opaque blob.
pub type AuthSerializer = fn(&DesiredState) -> Result<Option<AuthBlob>>;

/// The closed set of resource kinds handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// A scan source onboarded for secret scanning (GitHub org, Jira, ...).
    ScanSource,
    /// A connection to an external secret manager.
    SecretManager,
    /// A connection to a third-party integration (Jira, Slack).
    IntegrationConnection,
    /// A subscription routing events to an integration connection.
    IntegrationSubscription,
    /// A role/principal binding on a resource's IAM policy.
    IamPolicyBinding,
}

/// Per-kind behaviour consulted by the reconciler.
#[derive(Clone, Copy)]
pub struct KindCapabilities {
    /// Whether the reconciliation engine serves this kind at all.
    pub reconciled: bool,
    /// Whether in-place update exists remotely.
    pub supports_update: bool,
    /// Whether names are unique per project and checked before create.
    pub name_lookup: bool,
    /// Whether create requires auth material.
    pub auth_required: bool,
    /// Features the server tracks for this kind.
    pub known_features: &'static [&'static str],
    /// Auth encoder.
    pub serialize_auth: AuthSerializer,
}

static SCAN_SOURCE: KindCapabilities = KindCapabilities {
    reconciled: true,
    supports_update: false,
    name_lookup: false,
    auth_required: true,
    known_features: &[],
    serialize_auth: token_auth,
};

static SECRET_MANAGER: KindCapabilities = KindCapabilities {
    reconciled: true,
    supports_update: true,
    name_lookup: false,
    auth_required: true,
    known_features: &["copy_secrets"],
    serialize_auth: secret_manager_auth,
};

static INTEGRATION_CONNECTION: KindCapabilities = KindCapabilities {
    reconciled: true,
    supports_update: true,
    name_lookup: true,
    auth_required: true,
    known_features: &[],
    serialize_auth: connection_auth,
};

static INTEGRATION_SUBSCRIPTION: KindCapabilities = KindCapabilities {
    reconciled: true,
    supports_update: false,
    name_lookup: true,
    auth_required: false,
    known_features: &[],
    serialize_auth: no_auth,
};

static IAM_POLICY_BINDING: KindCapabilities = KindCapabilities {
    reconciled: false,
    supports_update: false,
    name_lookup: false,
    auth_required: false,
    known_features: &[],
    serialize_auth: no_auth,
};

impl ResourceKind {
    /// All kinds.
    pub const ALL: [Self; 5] = [
        Self::ScanSource,
        Self::SecretManager,
        Self::IntegrationConnection,
        Self::IntegrationSubscription,
        Self::IamPolicyBinding,
    ];

    /// Stable identifier used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScanSource => "scan-source",
            Self::SecretManager => "secret-manager",
            Self::IntegrationConnection => "integration-connection",
            Self::IntegrationSubscription => "integration-subscription",
            Self::IamPolicyBinding => "iam-policy-binding",
        }
    }

    /// Capability table entry for this kind.
    #[must_use]
    pub fn capabilities(self) -> &'static KindCapabilities {
        match self {
            Self::ScanSource => &SCAN_SOURCE,
            Self::SecretManager => &SECRET_MANAGER,
            Self::IntegrationConnection => &INTEGRATION_CONNECTION,
            Self::IntegrationSubscription => &INTEGRATION_SUBSCRIPTION,
            Self::IamPolicyBinding => &IAM_POLICY_BINDING,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl KindCapabilities {
    /// Returns true if the kind tracks a feature set.
    #[must_use]
    pub const fn carries_features(&self) -> bool {
        !self.known_features.is_empty()
    }
}

impl std::fmt::Debug for KindCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindCapabilities")
            .field("reconciled", &self.reconciled)
            .field("supports_update", &self.supports_update)
            .field("name_lookup", &self.name_lookup)
            .field("auth_required", &self.auth_required)
            .field("known_features", &self.known_features)
            .finish_non_exhaustive()
    }
}

/// Reads a string field that must be known at apply time.
fn known_str<'a>(
    desired: &DesiredState,
    field: &'a Field<String>,
    name: &str,
) -> Result<Option<&'a str>> {
    match field {
        Field::Unknown => Err(ReconcileError::MissingField {
            kind: desired.kind.to_string(),
            field: name.to_string(),
        }
        .into()),
        Field::Null => Ok(None),
        Field::Value(v) => Ok(Some(v.as_str())),
    }
}

fn token_auth(desired: &DesiredState) -> Result<Option<AuthBlob>> {
    let Some(token) = known_str(desired, &desired.token, "token")? else {
        return Ok(None);
    };
    AuthBlob::from_json(&json!({ "token": token })).map(Some)
}

fn secret_manager_auth(desired: &DesiredState) -> Result<Option<AuthBlob>> {
    let Some(token) = known_str(desired, &desired.token, "token")? else {
        return Ok(None);
    };
    let method = known_str(desired, &desired.auth_method, "auth_method")?.unwrap_or("token");
    AuthBlob::from_json(&json!({ "auth_method": method, "token": token })).map(Some)
}

fn connection_auth(desired: &DesiredState) -> Result<Option<AuthBlob>> {
    let Some(token) = known_str(desired, &desired.token, "token")? else {
        return Ok(None);
    };
    let blob = match known_str(desired, &desired.email, "email")? {
        Some(email) => json!({ "email": email, "token": token }),
        None => json!({ "token": token }),
    };
    AuthBlob::from_json(&blob).map(Some)
}

#[allow(clippy::unnecessary_wraps)]
fn no_auth(_desired: &DesiredState) -> Result<Option<AuthBlob>> {
    Ok(None)
}
