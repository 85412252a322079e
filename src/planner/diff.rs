//! Drift engine for comparing desired vs observed state.
//!
//! An update is split into two independent deltas, each mapping to at most
//! one remote call: the auth delta (fingerprint of the desired auth blob vs
//! the last one written) and the feature delta (explicit-null equality).

use serde_json::Value;
use tracing::debug;

use crate::config::PayloadHasher;
use crate::error::{ReconcileError, Result};
use crate::state::{AuthBlob, DesiredState, FeatureSet, Field, ObservedState, ResourceKind};

/// Engine for computing drift between desired and observed states.
#[derive(Debug, Default)]
pub struct DriftEngine {
    /// Payload hasher.
    hasher: PayloadHasher,
}

/// Detail about a specific difference. Never carries secret values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

/// Auth material to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    /// Serialized auth payload.
    pub blob: AuthBlob,
    /// Fingerprint to remember once the write succeeds.
    pub fingerprint: String,
}

/// Feature update to send.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureChange {
    /// Explicit-null encoded payload.
    pub payload: Value,
    /// Feature set the resource holds once the write succeeds.
    pub features: FeatureSet,
}

/// Drift for one resource instance.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDiff {
    /// Resource kind.
    pub kind: ResourceKind,
    /// External identifier.
    pub external_id: String,
    /// Auth delta, if the blob changed.
    pub auth: Option<AuthChange>,
    /// Feature delta, if the set changed.
    pub features: Option<FeatureChange>,
    /// Human-readable details.
    pub details: Vec<DiffDetail>,
}

impl UpdateDiff {
    /// Returns true if nothing needs to be written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.auth.is_none() && self.features.is_none()
    }

    /// Number of remote writes the diff implies.
    #[must_use]
    pub fn write_count(&self) -> usize {
        usize::from(self.auth.is_some()) + usize::from(self.features.is_some())
    }
}

impl DriftEngine {
    /// Creates a new drift engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: PayloadHasher::new(),
        }
    }

    /// Computes the drift between the desired state and the last observation.
    ///
    /// # Errors
    ///
    /// Returns an error if a replace-only field changed, if an auth field or
    /// the feature set is still unknown, or if the auth blob cannot be
    /// serialized.
    pub fn compute(&self, desired: &DesiredState, observed: &ObservedState) -> Result<UpdateDiff> {
        let kind = observed.kind();
        let external_id = observed.instance.external_id().to_string();
        Self::ensure_unchanged(desired, observed)?;
        let mut details = Vec::new();

        let auth = self.auth_delta(desired, observed, &mut details)?;
        let features = Self::feature_delta(desired, observed, &mut details)?;

        debug!(
            "Drift for {kind} {external_id}: auth {}, features {}",
            if auth.is_some() { "changed" } else { "unchanged" },
            if features.is_some() { "changed" } else { "unchanged" },
        );

        Ok(UpdateDiff {
            kind,
            external_id,
            auth,
            features,
            details,
        })
    }

    /// Rejects a set value that differs from what the object holds. Null and
    /// unknown values leave the field alone.
    fn ensure_unchanged(desired: &DesiredState, observed: &ObservedState) -> Result<()> {
        let kind = observed.kind();
        let replace_only = [
            (
                "name",
                desired.name.as_value().cloned(),
                observed.name.clone(),
            ),
            (
                "connection_url",
                desired.connection_url.as_value().cloned(),
                observed.connection_url.clone(),
            ),
            (
                "details",
                desired.details.as_value().map(Value::to_string),
                observed.details.as_ref().map(Value::to_string),
            ),
        ];

        for (field, new, old) in replace_only {
            let Some(new) = new else { continue };
            if old.as_deref() != Some(new.as_str()) {
                return Err(ReconcileError::ImmutableField {
                    kind: kind.to_string(),
                    field: field.to_string(),
                    old: old.unwrap_or_default(),
                    new,
                }
                .into());
            }
        }
        Ok(())
    }

    fn auth_delta(
        &self,
        desired: &DesiredState,
        observed: &ObservedState,
        details: &mut Vec<DiffDetail>,
    ) -> Result<Option<AuthChange>> {
        let kind = observed.kind();
        let Some(blob) = (kind.capabilities().serialize_auth)(desired)? else {
            return Ok(None);
        };

        let fingerprint = self.hasher.fingerprint_auth(kind, &blob);
        let unchanged = observed
            .auth_fingerprint
            .as_deref()
            .is_some_and(|last| PayloadHasher::hashes_match(last, &fingerprint));
        if unchanged {
            return Ok(None);
        }

        details.push(DiffDetail {
            field: String::from("auth"),
            old_value: observed
                .auth_fingerprint
                .as_deref()
                .map(|h| self.hasher.short_hash(h)),
            new_value: Some(self.hasher.short_hash(&fingerprint)),
        });

        Ok(Some(AuthChange { blob, fingerprint }))
    }

    fn feature_delta(
        desired: &DesiredState,
        observed: &ObservedState,
        details: &mut Vec<DiffDetail>,
    ) -> Result<Option<FeatureChange>> {
        let kind = observed.kind();
        let capabilities = kind.capabilities();
        if !capabilities.carries_features() {
            return Ok(None);
        }

        let wanted = match &desired.features {
            Field::Unknown => {
                return Err(ReconcileError::MissingField {
                    kind: kind.to_string(),
                    field: String::from("features"),
                }
                .into());
            }
            Field::Null => FeatureSet::new(),
            Field::Value(set) => set.clone(),
        };

        let known = capabilities.known_features;
        if wanted.equivalent(&observed.features, known) {
            return Ok(None);
        }

        details.push(DiffDetail {
            field: String::from("features"),
            old_value: Some(observed.features.to_omit_empty().to_string()),
            new_value: Some(wanted.to_omit_empty().to_string()),
        });

        Ok(Some(FeatureChange {
            payload: wanted.to_explicit_null_against(&observed.features, known),
            features: wanted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ProjectScope, ResourceInstance};
    use serde_json::json;

    fn observed(kind: ResourceKind, features: FeatureSet) -> ObservedState {
        ObservedState {
            instance: ResourceInstance::new(kind, ProjectScope::new("p"), "ext-1").unwrap(),
            name: None,
            auth_method: None,
            connection_url: None,
            features,
            details: None,
            auth_fingerprint: None,
        }
    }

    fn remembered(engine: &DriftEngine, desired: &DesiredState, mut state: ObservedState) -> ObservedState {
        let diff = engine.compute(desired, &state).unwrap();
        state.auth_fingerprint = diff.auth.map(|a| a.fingerprint);
        state
    }

    #[test]
    fn test_unknown_fingerprint_sends_auth() {
        let engine = DriftEngine::new();
        let desired = DesiredState::new(ResourceKind::SecretManager).with_token("t1");

        let diff = engine
            .compute(&desired, &observed(ResourceKind::SecretManager, FeatureSet::new()))
            .unwrap();

        assert!(diff.auth.is_some());
        assert!(diff.features.is_none());
        assert_eq!(diff.write_count(), 1);
    }

    #[test]
    fn test_same_token_is_drift_free() {
        let engine = DriftEngine::new();
        let features = FeatureSet::new().enable("copy_secrets");
        let desired = DesiredState::new(ResourceKind::SecretManager)
            .with_token("t1")
            .with_features(features.clone());
        let state = remembered(&engine, &desired, observed(ResourceKind::SecretManager, features));

        let diff = engine.compute(&desired, &state).unwrap();
        assert!(diff.is_empty());
        assert!(diff.details.is_empty());
    }

    #[test]
    fn test_rotated_token_detected() {
        let engine = DriftEngine::new();
        let first = DesiredState::new(ResourceKind::SecretManager).with_token("t1");
        let state = remembered(&engine, &first, observed(ResourceKind::SecretManager, FeatureSet::new()));

        let rotated = DesiredState::new(ResourceKind::SecretManager).with_token("t2");
        let diff = engine.compute(&rotated, &state).unwrap();

        assert!(diff.auth.is_some());
        assert!(!format!("{diff:?}").contains("t2"));
    }

    #[test]
    fn test_removed_features_sent_as_null() {
        let engine = DriftEngine::new();
        let desired = DesiredState::new(ResourceKind::SecretManager);
        let state = observed(
            ResourceKind::SecretManager,
            FeatureSet::new().enable("copy_secrets"),
        );

        let diff = engine.compute(&desired, &state).unwrap();
        let change = diff.features.unwrap();

        assert_eq!(change.payload, json!({ "copy_secrets": null }));
        assert!(change.features.is_empty());
    }

    #[test]
    fn test_features_ignored_for_kinds_without_them() {
        let engine = DriftEngine::new();
        let desired = DesiredState::new(ResourceKind::IntegrationConnection)
            .with_features(FeatureSet::new().enable("copy_secrets"));

        let diff = engine
            .compute(&desired, &observed(ResourceKind::IntegrationConnection, FeatureSet::new()))
            .unwrap();
        assert!(diff.features.is_none());
    }

    #[test]
    fn test_changed_connection_url_rejected() {
        let engine = DriftEngine::new();
        let mut state = observed(ResourceKind::SecretManager, FeatureSet::new());
        state.connection_url = Some(String::from("https://old.example.com"));
        let desired = DesiredState::new(ResourceKind::SecretManager)
            .with_token("t1")
            .with_connection_url("https://new.example.com");

        let err = engine.compute(&desired, &state).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
        assert!(matches!(
            err,
            crate::error::RadarError::Reconcile(ReconcileError::ImmutableField { ref field, ref old, .. })
                if field == "connection_url" && old == "https://old.example.com"
        ));
    }

    #[test]
    fn test_changed_details_rejected() {
        let engine = DriftEngine::new();
        let mut state = observed(ResourceKind::IntegrationConnection, FeatureSet::new());
        state.details = Some(json!({ "region": "eu" }));
        let mut desired = DesiredState::new(ResourceKind::IntegrationConnection);
        desired.details = Field::Value(json!({ "region": "us" }));

        let err = engine.compute(&desired, &state).unwrap_err();

        assert!(err.to_string().starts_with("details of"));
    }

    #[test]
    fn test_null_and_unknown_leave_replace_only_fields_alone() {
        let engine = DriftEngine::new();
        let mut state = observed(ResourceKind::SecretManager, FeatureSet::new());
        state.name = Some(String::from("vault-prod"));
        state.details = Some(json!({ "region": "eu" }));
        let mut desired = DesiredState::new(ResourceKind::SecretManager)
            .with_name("vault-prod")
            .with_token("t1");
        desired.connection_url = Field::Unknown;

        assert!(engine.compute(&desired, &state).is_ok());
    }

    #[test]
    fn test_unknown_features_rejected() {
        let engine = DriftEngine::new();
        let mut desired = DesiredState::new(ResourceKind::SecretManager);
        desired.features = Field::Unknown;

        assert!(engine
            .compute(&desired, &observed(ResourceKind::SecretManager, FeatureSet::new()))
            .is_err());
    }
}
