//! In-memory control plane.
//!
//! Simulates the remote side closely enough to exercise the engine: soft
//! deletes that take a configurable number of polls to finish offboarding,
//! etag-checked policy writes, and a journal of every call received.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::error::{RemoteError, Result};
use crate::state::{AuthBlob, FeatureSet, ProjectScope, ResourceKind};

use super::client::{PolicyApi, ResourceApi};
use super::types::{CreatePayload, Policy, PolicyBinding, RemoteResource};

/// One call received by [`InMemoryApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `create`.
    Create {
        /// Resource kind.
        kind: ResourceKind,
        /// Requested name.
        name: Option<String>,
    },
    /// `get_by_id`.
    GetById {
        /// Resource kind.
        kind: ResourceKind,
        /// External identifier.
        external_id: String,
    },
    /// `get_by_name`.
    GetByName {
        /// Resource kind.
        kind: ResourceKind,
        /// Requested name.
        name: String,
    },
    /// `update_auth`.
    UpdateAuth {
        /// Resource kind.
        kind: ResourceKind,
        /// External identifier.
        external_id: String,
    },
    /// `update_features`.
    UpdateFeatures {
        /// Resource kind.
        kind: ResourceKind,
        /// External identifier.
        external_id: String,
        /// Payload as sent.
        features: Value,
    },
    /// `soft_delete`.
    SoftDelete {
        /// Resource kind.
        kind: ResourceKind,
        /// External identifier.
        external_id: String,
    },
    /// `get_policy`.
    GetPolicy {
        /// Policy target.
        resource_name: String,
    },
    /// `set_policy`.
    SetPolicy {
        /// Policy target.
        resource_name: String,
    },
}

impl ApiCall {
    /// Returns true if the call mutates remote state.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::UpdateAuth { .. }
                | Self::UpdateFeatures { .. }
                | Self::SoftDelete { .. }
                | Self::SetPolicy { .. }
        )
    }
}

#[derive(Debug)]
struct StoredObject {
    scope: ProjectScope,
    resource: RemoteResource,
    auth: Option<AuthBlob>,
    // Reads left before a soft-deleted object disappears. `None` never finishes.
    offboard_remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(ResourceKind, String), StoredObject>,
    policies: HashMap<String, Policy>,
    journal: Vec<ApiCall>,
    next_id: u64,
    preset_ids: VecDeque<String>,
    offboard_polls: Option<u32>,
    fail_next: Option<RemoteError>,
}

/// Thread-safe in-memory implementation of [`ResourceApi`] and [`PolicyApi`].
#[derive(Debug)]
pub struct InMemoryApi {
    inner: Mutex<Inner>,
}

impl Default for InMemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryApi {
    /// Creates an empty control plane. Soft-deleted objects disappear on the
    /// first read after the delete.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                offboard_polls: Some(0),
                ..Inner::default()
            }),
        }
    }

    /// Sets how many reads a soft-deleted object keeps reporting `deleted`
    /// before it is gone. `None` means offboarding never finishes.
    #[must_use]
    pub fn with_offboard_polls(self, polls: Option<u32>) -> Self {
        self.lock().offboard_polls = polls;
        self
    }

    /// Queues identifiers handed out by subsequent creates.
    #[must_use]
    pub fn with_next_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().preset_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Seeds an existing object.
    pub fn insert(&self, kind: ResourceKind, scope: ProjectScope, resource: RemoteResource) {
        let offboard_remaining = self.lock().offboard_polls;
        self.lock().objects.insert(
            (kind, resource.id.clone()),
            StoredObject {
                scope,
                resource,
                auth: None,
                offboard_remaining,
            },
        );
    }

    /// Seeds a policy with a fresh etag.
    pub fn insert_policy(&self, resource_name: &str, bindings: Vec<PolicyBinding>) -> Policy {
        let policy = Policy {
            etag: new_etag(),
            bindings,
        };
        self.lock()
            .policies
            .insert(resource_name.to_string(), policy.clone());
        policy
    }

    /// Marks an object deleted or restores it, without journaling a call.
    pub fn set_deleted(&self, kind: ResourceKind, external_id: &str, deleted: bool) {
        if let Some(object) = self
            .lock()
            .objects
            .get_mut(&(kind, external_id.to_string()))
        {
            object.resource.deleted = deleted;
        }
    }

    /// Makes the next call fail with the given error.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().fail_next = Some(error);
    }

    /// Current server-side view of an object.
    #[must_use]
    pub fn object(&self, kind: ResourceKind, external_id: &str) -> Option<RemoteResource> {
        self.lock()
            .objects
            .get(&(kind, external_id.to_string()))
            .map(|o| o.resource.clone())
    }

    /// Auth material last written to an object.
    #[must_use]
    pub fn stored_auth(&self, kind: ResourceKind, external_id: &str) -> Option<AuthBlob> {
        self.lock()
            .objects
            .get(&(kind, external_id.to_string()))
            .and_then(|o| o.auth.clone())
    }

    /// Current policy on a resource.
    #[must_use]
    pub fn stored_policy(&self, resource_name: &str) -> Option<Policy> {
        self.lock().policies.get(resource_name).cloned()
    }

    /// Every call received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().journal.clone()
    }

    /// Number of calls that mutated remote state.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().journal.iter().filter(|c| c.is_write()).count()
    }

    /// Forgets the journal.
    pub fn clear_calls(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Journals the call, then fires any injected failure.
    fn begin(&self, call: ApiCall) -> Result<MutexGuard<'_, Inner>> {
        trace!("In-memory control plane received {call:?}");
        let mut inner = self.lock();
        inner.journal.push(call);
        match inner.fail_next.take() {
            Some(err) => Err(err.into()),
            None => Ok(inner),
        }
    }
}

fn new_etag() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn describe(kind: ResourceKind, id: &str) -> String {
    format!("{kind} {id}")
}

impl Inner {
    fn object_in_scope(
        &mut self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
    ) -> Result<&mut StoredObject> {
        self.objects
            .get_mut(&(kind, external_id.to_string()))
            .filter(|o| &o.scope == scope)
            .ok_or_else(|| RemoteError::not_found(describe(kind, external_id)).into())
    }

    fn allocate_id(&mut self) -> String {
        self.preset_ids.pop_front().unwrap_or_else(|| {
            self.next_id += 1;
            format!("ext-{}", self.next_id)
        })
    }
}

#[async_trait]
impl ResourceApi for InMemoryApi {
    async fn create(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        payload: &CreatePayload,
    ) -> Result<String> {
        let mut inner = self.begin(ApiCall::Create {
            kind,
            name: payload.name.clone(),
        })?;

        let id = inner.allocate_id();
        let features = match &payload.features {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        let offboard_remaining = inner.offboard_polls;
        inner.objects.insert(
            (kind, id.clone()),
            StoredObject {
                scope: scope.clone(),
                resource: RemoteResource {
                    id: id.clone(),
                    name: payload.name.clone(),
                    deleted: false,
                    auth_method: payload.auth_method.clone(),
                    connection_url: payload.connection_url.clone(),
                    features,
                    details: payload.details.clone(),
                },
                auth: payload.auth.clone(),
                offboard_remaining,
            },
        );
        Ok(id)
    }

    async fn get_by_id(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
    ) -> Result<RemoteResource> {
        let mut inner = self.begin(ApiCall::GetById {
            kind,
            external_id: external_id.to_string(),
        })?;

        let object = inner.object_in_scope(kind, scope, external_id)?;
        if !object.resource.deleted {
            return Ok(object.resource.clone());
        }

        match object.offboard_remaining {
            Some(0) => {
                inner.objects.remove(&(kind, external_id.to_string()));
                Err(RemoteError::not_found(describe(kind, external_id)).into())
            }
            Some(n) => {
                object.offboard_remaining = Some(n - 1);
                Ok(object.resource.clone())
            }
            None => Ok(object.resource.clone()),
        }
    }

    async fn get_by_name(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        name: &str,
    ) -> Result<RemoteResource> {
        let inner = self.begin(ApiCall::GetByName {
            kind,
            name: name.to_string(),
        })?;

        inner
            .objects
            .iter()
            .find(|((k, _), o)| {
                *k == kind && &o.scope == scope && o.resource.name.as_deref() == Some(name)
            })
            .map(|(_, o)| o.resource.clone())
            .ok_or_else(|| RemoteError::not_found(format!("{kind} named {name}")).into())
    }

    async fn update_auth(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
        auth: &AuthBlob,
    ) -> Result<()> {
        let mut inner = self.begin(ApiCall::UpdateAuth {
            kind,
            external_id: external_id.to_string(),
        })?;

        inner.object_in_scope(kind, scope, external_id)?.auth = Some(auth.clone());
        Ok(())
    }

    async fn update_features(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
        features: &Value,
    ) -> Result<()> {
        let mut inner = self.begin(ApiCall::UpdateFeatures {
            kind,
            external_id: external_id.to_string(),
            features: features.clone(),
        })?;

        let Value::Object(update) = features else {
            return Err(RemoteError::api_error(400, "features must be an object").into());
        };
        let object = inner.object_in_scope(kind, scope, external_id)?;
        let mut current = FeatureSet::from_map(&object.resource.features);
        current.apply_update(update);
        object.resource.features = match current.to_omit_empty() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(())
    }

    async fn soft_delete(
        &self,
        kind: ResourceKind,
        scope: &ProjectScope,
        external_id: &str,
    ) -> Result<()> {
        let mut inner = self.begin(ApiCall::SoftDelete {
            kind,
            external_id: external_id.to_string(),
        })?;

        let offboard_polls = inner.offboard_polls;
        let object = inner.object_in_scope(kind, scope, external_id)?;
        if object.resource.deleted {
            let message = format!("{} is already being offboarded", describe(kind, external_id));
            return Err(RemoteError::api_error(409, message).into());
        }
        object.resource.deleted = true;
        object.offboard_remaining = offboard_polls;
        Ok(())
    }
}

#[async_trait]
impl PolicyApi for InMemoryApi {
    async fn get_policy(&self, resource_name: &str) -> Result<Policy> {
        let inner = self.begin(ApiCall::GetPolicy {
            resource_name: resource_name.to_string(),
        })?;

        inner
            .policies
            .get(resource_name)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("policy on {resource_name}")).into())
    }

    async fn set_policy(&self, resource_name: &str, policy: &Policy) -> Result<Policy> {
        let mut inner = self.begin(ApiCall::SetPolicy {
            resource_name: resource_name.to_string(),
        })?;

        let current_etag = inner
            .policies
            .get(resource_name)
            .map(|p| p.etag.clone())
            .unwrap_or_default();
        if current_etag != policy.etag {
            return Err(RemoteError::conflict(
                format!("policy on {resource_name}"),
                format!("etag '{}' does not match current '{current_etag}'", policy.etag),
            )
            .into());
        }

        let stored = Policy {
            etag: new_etag(),
            bindings: policy.bindings.clone(),
        };
        inner
            .policies
            .insert(resource_name.to_string(), stored.clone());
        Ok(stored)
    }
}
