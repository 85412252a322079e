//! Reconciliation engine.
//!
//! This module drives a single resource instance between "absent" and
//! "present and matching the plan". Every kind goes through the same state
//! machine; per-kind behaviour comes from [`KindCapabilities`].
//!
//! [`KindCapabilities`]: crate::state::KindCapabilities

use tracing::{debug, info, warn};

use crate::config::{ConfigValidator, PayloadHasher, ProviderConfig};
use crate::context::OperationContext;
use crate::error::{RadarError, ReconcileError, RemoteError, Result};
use crate::offboard::{Clock, OffboardPoller, PollReport, PollSettings};
use crate::planner::{DriftEngine, PlannedCall, UpdatePlan};
use crate::remote::{CreatePayload, ResourceApi};
use crate::state::{
    DesiredState, FeatureSet, Field, ObservedState, ProjectScope, ResourceInstance, ResourceKind,
};

/// Result of reading a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The object exists; mutable fields were refreshed.
    Present(ObservedState),
    /// The object is soft-deleted and offboarding. The caller keeps its prior
    /// state untouched; nothing in the response is trusted.
    PendingDeletion(ResourceInstance),
    /// The object is gone. The caller drops it from state.
    Gone,
}

/// Result of a successful delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing to delete.
    AlreadyGone,
    /// The object was offboarded.
    Offboarded(PollReport),
}

/// Reconciliation engine for one remote resource family.
pub struct Reconciler<'a, A: ResourceApi + ?Sized, C: Clock> {
    /// Remote client.
    api: &'a A,
    /// Clock driving offboard polling.
    clock: C,
    /// Provider-wide default project.
    default_project: Option<String>,
    /// Offboard polling cadence.
    poll_settings: PollSettings,
    /// Drift engine.
    drift_engine: DriftEngine,
    /// Payload hasher.
    hasher: PayloadHasher,
}

impl<'a, A: ResourceApi + ?Sized, C: Clock> Reconciler<'a, A, C> {
    /// Creates a reconciler with no default project and default polling.
    #[must_use]
    pub fn new(api: &'a A, clock: C) -> Self {
        Self {
            api,
            clock,
            default_project: None,
            poll_settings: PollSettings::default(),
            drift_engine: DriftEngine::new(),
            hasher: PayloadHasher::new(),
        }
    }

    /// Creates a reconciler from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn from_config(api: &'a A, clock: C, config: &ProviderConfig) -> Result<Self> {
        ConfigValidator::new().validate(config)?;

        let mut reconciler = Self::new(api, clock).with_poll_settings(config.poll_settings());
        reconciler.default_project.clone_from(&config.project_id);
        Ok(reconciler)
    }

    /// Sets the provider-wide default project.
    #[must_use]
    pub fn with_default_project(mut self, project_id: impl Into<String>) -> Self {
        self.default_project = Some(project_id.into());
        self
    }

    /// Sets the offboard polling cadence.
    #[must_use]
    pub const fn with_poll_settings(mut self, settings: PollSettings) -> Self {
        self.poll_settings = settings;
        self
    }

    /// Project the resource will land in, as known at plan time. An unknown
    /// project stays unknown instead of falling back to the default.
    #[must_use]
    pub fn planned_project(&self, desired: &DesiredState) -> Field<String> {
        ProjectScope::plan(&desired.project_id, self.default_project.as_deref())
    }

    /// The clock driving offboard polling.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Creates the remote object described by `desired`.
    ///
    /// Name-unique kinds are checked for an existing object first. The write
    /// response is authoritative: the returned state is built from the
    /// request, without a read-back.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The kind is not served by the engine
    /// - The project, name or auth material is missing or unknown
    /// - An object with the same name already exists
    /// - The context is cancelled
    /// - A remote call fails
    pub async fn create(
        &self,
        ctx: &OperationContext,
        desired: &DesiredState,
    ) -> Result<ObservedState> {
        let kind = desired.kind;
        let capabilities = ensure_reconciled(kind, "create")?;
        let scope = ProjectScope::resolve(kind, &desired.project_id, self.default_project.as_deref())?;

        let name = known(kind, &desired.name, "name")?;
        if capabilities.name_lookup {
            let Some(name) = name.as_deref() else {
                return Err(missing(kind, "name"));
            };
            self.ensure_name_free(ctx, kind, &scope, name).await?;
        }

        let auth = (capabilities.serialize_auth)(desired)?;
        if capabilities.auth_required && auth.is_none() {
            return Err(missing(kind, "token"));
        }

        let features = if capabilities.carries_features() {
            match &desired.features {
                Field::Unknown => return Err(missing(kind, "features")),
                Field::Null => FeatureSet::new(),
                Field::Value(set) => set.clone(),
            }
        } else {
            FeatureSet::new()
        };

        let payload = CreatePayload {
            name: name.clone(),
            connection_url: known(kind, &desired.connection_url, "connection_url")?,
            auth_method: known(kind, &desired.auth_method, "auth_method")?,
            auth: auth.clone(),
            features: capabilities
                .carries_features()
                .then(|| features.to_omit_empty()),
            details: known(kind, &desired.details, "details")?,
        };

        ctx.check(kind, "create")?;
        let label = name.as_deref().unwrap_or_default();
        debug!("Creating {kind} '{label}' in project {scope}");
        let external_id = self
            .api
            .create(kind, &scope, &payload)
            .await
            .map_err(|e| e.in_operation("create", kind, label))?;

        if external_id.is_empty() {
            return Err(ReconcileError::Unexpected {
                kind: kind.to_string(),
                external_id: String::new(),
                message: String::from("create returned an empty identifier"),
            }
            .into());
        }

        info!("Created {kind} {external_id} in project {scope}");

        let auth_fingerprint = auth
            .as_ref()
            .map(|blob| self.hasher.fingerprint_auth(kind, blob));

        Ok(ObservedState {
            instance: ResourceInstance::new(kind, scope, external_id)?,
            name: payload.name,
            auth_method: payload.auth_method,
            connection_url: payload.connection_url,
            features,
            details: payload.details,
            auth_fingerprint,
        })
    }

    /// Reads the remote object.
    ///
    /// A missing object is reported as [`ReadOutcome::Gone`], not an error. A
    /// soft-deleted object is reported as [`ReadOutcome::PendingDeletion`]
    /// without refreshing any field from the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is not served by the engine, the context
    /// is cancelled, or the read fails for a reason other than not-found.
    pub async fn read(
        &self,
        ctx: &OperationContext,
        instance: &ResourceInstance,
    ) -> Result<ReadOutcome> {
        let kind = instance.kind();
        let external_id = instance.external_id();
        ensure_reconciled(kind, "read")?;

        ctx.check(kind, "read")?;
        let remote = match self
            .api
            .get_by_id(kind, instance.project_scope(), external_id)
            .await
        {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                info!("{kind} {external_id} no longer exists, dropping it from state");
                return Ok(ReadOutcome::Gone);
            }
            Err(e) => return Err(e.in_operation("read", kind, external_id)),
        };

        if remote.deleted {
            warn!("{kind} {external_id} is marked for deletion; keeping prior state");
            return Ok(ReadOutcome::PendingDeletion(instance.clone().with_deleted(true)));
        }

        debug!("Read {kind} {external_id}");
        Ok(ReadOutcome::Present(ObservedState::from_remote(
            instance.clone(),
            &remote,
        )))
    }

    /// Reads the remote object, carrying locally-held sensitive state over
    /// from the prior observation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub async fn refresh(
        &self,
        ctx: &OperationContext,
        prior: &ObservedState,
    ) -> Result<ReadOutcome> {
        Ok(match self.read(ctx, &prior.instance).await? {
            ReadOutcome::Present(observed) => {
                ReadOutcome::Present(observed.carry_sensitive_from(prior))
            }
            other => other,
        })
    }

    /// Updates the object in place, issuing only the writes whose payload
    /// changed: at most one auth write and one feature write.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The kind has no in-place update
    /// - The project, name, connection URL or details changed
    /// - An auth field or the feature set is unknown
    /// - The context is cancelled before a write
    /// - A remote write fails
    pub async fn update(
        &self,
        ctx: &OperationContext,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> Result<ObservedState> {
        let kind = observed.kind();
        let external_id = observed.instance.external_id();
        let capabilities = ensure_reconciled(kind, "update")?;
        if !capabilities.supports_update {
            return Err(ReconcileError::NotSupported {
                kind: kind.to_string(),
                operation: String::from("update"),
            }
            .into());
        }

        let current = observed.instance.project_scope();
        let scope = ProjectScope::resolve(kind, &desired.project_id, self.default_project.as_deref())?;
        if &scope != current {
            return Err(ReconcileError::ImmutableField {
                kind: kind.to_string(),
                field: String::from("project_id"),
                old: current.to_string(),
                new: scope.to_string(),
            }
            .into());
        }

        let plan = UpdatePlan::from_diff(self.drift_engine.compute(desired, observed)?);
        if plan.is_empty() {
            debug!("{kind} {external_id} matches the plan, nothing to update");
            return Ok(observed.clone());
        }

        debug!("{plan}");

        let mut next = observed.clone();
        for action in plan.actions {
            ctx.check(kind, "update")?;
            match action {
                PlannedCall::UpdateAuth(change) => {
                    self.api
                        .update_auth(kind, current, external_id, &change.blob)
                        .await
                        .map_err(|e| e.in_operation("update auth of", kind, external_id))?;
                    next.auth_fingerprint = Some(change.fingerprint);
                    if let Some(method) = desired.auth_method.as_value() {
                        next.auth_method = Some(method.clone());
                    }
                }
                PlannedCall::UpdateFeatures(change) => {
                    self.api
                        .update_features(kind, current, external_id, &change.payload)
                        .await
                        .map_err(|e| e.in_operation("update features of", kind, external_id))?;
                    next.features = change.features;
                }
            }
        }

        info!("Updated {kind} {external_id}");
        Ok(next)
    }

    /// Deletes the object and waits for offboarding to finish.
    ///
    /// An object that is already gone is a success. An object already marked
    /// for deletion is not soft-deleted again; only the wait resumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is not served by the engine, a remote call
    /// fails, or the offboard wait times out, is cancelled, or sees the object
    /// reappear.
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        instance: &ResourceInstance,
    ) -> Result<DeleteOutcome> {
        let kind = instance.kind();
        let scope = instance.project_scope();
        let external_id = instance.external_id();
        ensure_reconciled(kind, "delete")?;

        ctx.check(kind, "delete")?;
        let remote = match self.api.get_by_id(kind, scope, external_id).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                info!("{kind} {external_id} already deleted");
                return Ok(DeleteOutcome::AlreadyGone);
            }
            Err(e) => return Err(e.in_operation("delete", kind, external_id)),
        };

        if remote.deleted {
            info!("{kind} {external_id} is already offboarding, resuming wait");
        } else {
            ctx.check(kind, "delete")?;
            match self.api.soft_delete(kind, scope, external_id).await {
                Ok(()) => info!("Requested offboarding of {kind} {external_id}"),
                Err(e) if e.is_not_found() => {
                    info!("{kind} {external_id} disappeared before it could be deleted");
                    return Ok(DeleteOutcome::AlreadyGone);
                }
                Err(e) => return Err(e.in_operation("delete", kind, external_id)),
            }
        }

        let pending = instance.clone().with_deleted(true);
        let report = OffboardPoller::new(self.api, &self.clock, self.poll_settings)
            .wait(ctx, &pending)
            .await?;

        Ok(DeleteOutcome::Offboarded(report))
    }

    /// Adopts an existing remote object by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist, is pending deletion,
    /// or cannot be read.
    pub async fn import(
        &self,
        ctx: &OperationContext,
        kind: ResourceKind,
        project_id: Option<&str>,
        external_id: &str,
    ) -> Result<ObservedState> {
        ensure_reconciled(kind, "import")?;
        let project = Field::from(project_id.map(str::to_string));
        let scope = ProjectScope::resolve(kind, &project, self.default_project.as_deref())?;
        let instance = ResourceInstance::new(kind, scope, external_id)?;

        match self.read(ctx, &instance).await? {
            ReadOutcome::Present(observed) => {
                info!("Imported {kind} {external_id}");
                Ok(observed)
            }
            ReadOutcome::PendingDeletion(_) => Err(ReconcileError::Unexpected {
                kind: kind.to_string(),
                external_id: external_id.to_string(),
                message: String::from("cannot import an object that is being offboarded"),
            }
            .into()),
            ReadOutcome::Gone => {
                Err(RadarError::from(RemoteError::not_found(format!("{kind} {external_id}")))
                    .in_operation("import", kind, external_id))
            }
        }
    }

    async fn ensure_name_free(
        &self,
        ctx: &OperationContext,
        kind: ResourceKind,
        scope: &ProjectScope,
        name: &str,
    ) -> Result<()> {
        ctx.check(kind, "create")?;
        match self.api.get_by_name(kind, scope, name).await {
            Ok(existing) => {
                debug!("{kind} '{name}' already exists as {}", existing.id);
                Err(ReconcileError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
                .into())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.in_operation("look up", kind, name)),
        }
    }
}

fn ensure_reconciled(
    kind: ResourceKind,
    operation: &str,
) -> Result<&'static crate::state::KindCapabilities> {
    let capabilities = kind.capabilities();
    if !capabilities.reconciled {
        return Err(ReconcileError::NotSupported {
            kind: kind.to_string(),
            operation: operation.to_string(),
        }
        .into());
    }
    Ok(capabilities)
}

fn missing(kind: ResourceKind, field: &str) -> RadarError {
    ReconcileError::MissingField {
        kind: kind.to_string(),
        field: field.to_string(),
    }
    .into()
}

// Unknown is an error at apply time; null becomes None.
fn known<T: Clone>(kind: ResourceKind, field: &Field<T>, name: &str) -> Result<Option<T>> {
    match field {
        Field::Unknown => Err(missing(kind, name)),
        Field::Null => Ok(None),
        Field::Value(v) => Ok(Some(v.clone())),
    }
}

impl ReadOutcome {
    /// The observed state, if the object is present.
    #[must_use]
    pub const fn observed(&self) -> Option<&ObservedState> {
        match self {
            Self::Present(observed) => Some(observed),
            Self::PendingDeletion(_) | Self::Gone => None,
        }
    }

    /// Returns true if the object is soft-deleted.
    #[must_use]
    pub const fn is_pending_deletion(&self) -> bool {
        matches!(self, Self::PendingDeletion(_))
    }
}

impl std::fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyGone => write!(f, "already gone"),
            Self::Offboarded(report) => write!(
                f,
                "offboarded after {} polls ({}s)",
                report.polls,
                report.waited.as_secs()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::offboard::FakeClock;
    use crate::remote::{ApiCall, InMemoryApi, MockResourceApi, RemoteResource};
    use serde_json::json;
    use std::time::Duration;

    const PROJECT: &str = "project-1";

    fn reconciler(api: &InMemoryApi) -> Reconciler<'_, InMemoryApi, FakeClock> {
        Reconciler::new(api, FakeClock::new()).with_default_project(PROJECT)
    }

    fn bg() -> OperationContext {
        OperationContext::background()
    }

    fn soft_deletes(api: &InMemoryApi) -> usize {
        api.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::SoftDelete { .. }))
            .count()
    }

    fn secret_manager() -> DesiredState {
        DesiredState::new(ResourceKind::SecretManager)
            .with_name("vault-prod")
            .with_connection_url("https://vault.example.com")
            .with_token("s3cr3t")
            .with_features(FeatureSet::new().enable("copy_secrets"))
    }

    #[tokio::test]
    async fn test_end_to_end_scan_source() {
        let api = InMemoryApi::new()
            .with_next_ids(["ext-123"])
            .with_offboard_polls(Some(2));
        let engine = reconciler(&api);
        let desired = DesiredState::new(ResourceKind::ScanSource)
            .with_name("src-1")
            .with_token("t1");

        let created = engine.create(&bg(), &desired).await.unwrap();
        assert_eq!(created.instance.external_id(), "ext-123");
        assert_eq!(created.instance.project_scope().as_str(), PROJECT);

        let outcome = engine.read(&bg(), &created.instance).await.unwrap();
        let observed = outcome.observed().unwrap();
        assert_eq!(observed.name.as_deref(), Some("src-1"));
        assert!(!observed.instance.is_deleted());

        api.clear_calls();
        let deleted = engine.delete(&bg(), &created.instance).await.unwrap();
        let DeleteOutcome::Offboarded(report) = deleted else {
            panic!("expected offboarding, got {deleted:?}");
        };
        assert_eq!(report.polls, 3);
        assert!(report.waited < Duration::from_secs(600));

        let calls = api.calls();
        assert!(matches!(calls[0], ApiCall::GetById { .. }));
        assert!(matches!(calls[1], ApiCall::SoftDelete { .. }));
        assert!(calls[2..].iter().all(|c| matches!(c, ApiCall::GetById { .. })));
        assert!(api.object(ResourceKind::ScanSource, "ext-123").is_none());
    }

    #[tokio::test]
    async fn test_create_does_not_read_back() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);

        let created = engine.create(&bg(), &secret_manager()).await.unwrap();

        assert_eq!(api.calls().len(), 1);
        assert!(created.auth_fingerprint.is_some());
        assert!(created.features.contains("copy_secrets"));
        assert_eq!(
            api.stored_auth(ResourceKind::SecretManager, created.instance.external_id())
                .unwrap()
                .expose(),
            r#"{"auth_method":"token","token":"s3cr3t"}"#
        );
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let desired = DesiredState::new(ResourceKind::ScanSource).with_token("t1");
        let created = engine.create(&bg(), &desired).await.unwrap();

        let first = engine.delete(&bg(), &created.instance).await.unwrap();
        let second = engine.delete(&bg(), &created.instance).await.unwrap();

        assert!(matches!(first, DeleteOutcome::Offboarded(_)));
        assert_eq!(second, DeleteOutcome::AlreadyGone);
        assert_eq!(soft_deletes(&api), 1);
    }

    #[tokio::test]
    async fn test_name_collision_blocks_create() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let desired = DesiredState::new(ResourceKind::IntegrationConnection)
            .with_name("jira")
            .with_email("ops@example.com")
            .with_token("t1");
        engine.create(&bg(), &desired).await.unwrap();
        api.clear_calls();

        let err = engine.create(&bg(), &desired).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(api.write_count(), 0);
        assert_eq!(
            api.calls(),
            vec![ApiCall::GetByName {
                kind: ResourceKind::IntegrationConnection,
                name: String::from("jira"),
            }]
        );
    }

    #[tokio::test]
    async fn test_name_collision_never_calls_create() {
        let mut api = MockResourceApi::new();
        api.expect_get_by_name().times(1).returning(|_, _, name| {
            Ok(RemoteResource {
                id: String::from("ext-9"),
                name: Some(name.to_string()),
                ..RemoteResource::default()
            })
        });
        api.expect_create().never();
        let engine = Reconciler::new(&api, FakeClock::new()).with_default_project(PROJECT);
        let desired = DesiredState::new(ResourceKind::IntegrationSubscription).with_name("alerts");

        let err = engine.create(&bg(), &desired).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_name_required_for_unique_kinds() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);

        let err = engine
            .create(&bg(), &DesiredState::new(ResourceKind::IntegrationSubscription))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_is_sticky() {
        let api = InMemoryApi::new().with_offboard_polls(Some(3));
        let engine = reconciler(&api);
        let created = engine
            .create(&bg(), &DesiredState::new(ResourceKind::ScanSource).with_token("t1"))
            .await
            .unwrap();
        let id = created.instance.external_id();
        api.set_deleted(ResourceKind::ScanSource, id, true);

        let outcome = engine.read(&bg(), &created.instance).await.unwrap();
        assert!(outcome.is_pending_deletion());

        let deleted = engine.delete(&bg(), &created.instance).await.unwrap();
        assert!(matches!(deleted, DeleteOutcome::Offboarded(_)));
        assert_eq!(soft_deletes(&api), 0);
    }

    #[tokio::test]
    async fn test_pending_deletion_read_trusts_nothing() {
        let api = InMemoryApi::new().with_offboard_polls(None);
        let engine = reconciler(&api);
        let scope = ProjectScope::new(PROJECT);
        api.insert(
            ResourceKind::SecretManager,
            scope.clone(),
            RemoteResource {
                id: String::from("ext-5"),
                name: Some(String::from("garbage")),
                deleted: true,
                ..RemoteResource::default()
            },
        );
        let instance = ResourceInstance::new(ResourceKind::SecretManager, scope, "ext-5").unwrap();

        let outcome = engine.read(&bg(), &instance).await.unwrap();

        assert!(outcome.observed().is_none());
        let ReadOutcome::PendingDeletion(pending) = outcome else {
            panic!("expected pending deletion");
        };
        assert!(pending.is_deleted());
    }

    #[tokio::test]
    async fn test_read_missing_is_gone() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let instance =
            ResourceInstance::new(ResourceKind::ScanSource, ProjectScope::new(PROJECT), "ext-404")
                .unwrap();

        assert_eq!(engine.read(&bg(), &instance).await.unwrap(), ReadOutcome::Gone);
    }

    #[tokio::test]
    async fn test_drift_free_update_writes_nothing() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let desired = secret_manager();
        let created = engine.create(&bg(), &desired).await.unwrap();
        let ReadOutcome::Present(observed) = engine.refresh(&bg(), &created).await.unwrap() else {
            panic!("expected present");
        };
        api.clear_calls();

        let updated = engine.update(&bg(), &desired, &observed).await.unwrap();

        assert_eq!(api.write_count(), 0);
        assert_eq!(updated, observed);
    }

    #[tokio::test]
    async fn test_drift_free_update_with_mock() {
        let mut api = MockResourceApi::new();
        api.expect_update_auth().never();
        api.expect_update_features().never();
        api.expect_get_by_id().never();
        let engine = Reconciler::new(&api, FakeClock::new()).with_default_project(PROJECT);
        let desired = secret_manager();
        let blob = (ResourceKind::SecretManager.capabilities().serialize_auth)(&desired)
            .unwrap()
            .unwrap();
        let observed = ObservedState {
            instance: ResourceInstance::new(
                ResourceKind::SecretManager,
                ProjectScope::new(PROJECT),
                "ext-1",
            )
            .unwrap(),
            name: Some(String::from("vault-prod")),
            auth_method: Some(String::from("token")),
            connection_url: Some(String::from("https://vault.example.com")),
            features: FeatureSet::new().enable("copy_secrets"),
            details: None,
            auth_fingerprint: Some(
                PayloadHasher::new().fingerprint_auth(ResourceKind::SecretManager, &blob),
            ),
        };

        engine.update(&bg(), &desired, &observed).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_features() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();
        api.clear_calls();

        let desired = secret_manager().with_features(FeatureSet::new());
        let updated = engine.update(&bg(), &desired, &created).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![ApiCall::UpdateFeatures {
                kind: ResourceKind::SecretManager,
                external_id: created.instance.external_id().to_string(),
                features: json!({ "copy_secrets": null }),
            }]
        );
        assert!(updated.features.is_empty());
        let remote = api
            .object(ResourceKind::SecretManager, created.instance.external_id())
            .unwrap();
        assert!(remote.features.is_empty());
    }

    #[tokio::test]
    async fn test_update_rotates_token() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();
        api.clear_calls();

        let desired = secret_manager().with_token("rotated");
        let updated = engine.update(&bg(), &desired, &created).await.unwrap();

        assert_eq!(api.write_count(), 1);
        assert!(matches!(api.calls()[0], ApiCall::UpdateAuth { .. }));
        assert_ne!(updated.auth_fingerprint, created.auth_fingerprint);

        api.clear_calls();
        engine.update(&bg(), &desired, &updated).await.unwrap();
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_not_supported() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let desired = DesiredState::new(ResourceKind::ScanSource).with_token("t1");
        let created = engine.create(&bg(), &desired).await.unwrap();
        api.clear_calls();

        let err = engine
            .update(&bg(), &desired.clone().with_token("t2"), &created)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_project_change_rejected() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();

        let desired = secret_manager().with_project("project-2");
        let err = engine.update(&bg(), &desired, &created).await.unwrap_err();

        assert!(matches!(
            err,
            RadarError::Reconcile(ReconcileError::ImmutableField { .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_url_change_rejected() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();
        api.clear_calls();

        let desired = secret_manager()
            .with_connection_url("https://vault-new.example.com")
            .with_token("rotated");
        let err = engine.update(&bg(), &desired, &created).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("https://vault-new.example.com"));
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_name_change_rejected() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();
        api.clear_calls();

        let err = engine
            .update(&bg(), &secret_manager().with_name("vault-staging"), &created)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RadarError::Reconcile(ReconcileError::ImmutableField { ref field, .. }) if field == "name"
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_planned_project() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let mut desired = secret_manager();

        assert_eq!(engine.planned_project(&desired), Field::Value(PROJECT.to_string()));

        desired.project_id = Field::Unknown;
        assert_eq!(engine.planned_project(&desired), Field::Unknown);

        let desired = secret_manager().with_project("project-9");
        assert_eq!(
            engine.planned_project(&desired),
            Field::Value(String::from("project-9"))
        );

        let bare = Reconciler::new(&api, FakeClock::new());
        assert_eq!(bare.planned_project(&secret_manager()), Field::Null);
    }

    #[test]
    fn test_from_config_validates() {
        let api = InMemoryApi::new();
        let mut config = ProviderConfig::default();
        config.offboard.poll_interval_secs = 0;

        let err = Reconciler::from_config(&api, FakeClock::new(), &config)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let config = ProviderConfig {
            project_id: Some(String::from("4b8c7f1e-2d3a-4e5f-9a6b-7c8d9e0f1a2b")),
            ..ProviderConfig::default()
        };
        let engine = Reconciler::from_config(&api, FakeClock::new(), &config).unwrap();
        assert_eq!(
            engine.planned_project(&secret_manager()),
            Field::Value(String::from("4b8c7f1e-2d3a-4e5f-9a6b-7c8d9e0f1a2b"))
        );
    }

    #[tokio::test]
    async fn test_explicit_project_wins_over_default() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);

        let created = engine
            .create(&bg(), &secret_manager().with_project("project-9"))
            .await
            .unwrap();

        assert_eq!(created.instance.project_scope().as_str(), "project-9");
    }

    #[tokio::test]
    async fn test_unknown_project_not_defaulted() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let mut desired = secret_manager();
        desired.project_id = Field::Unknown;

        let err = engine.create(&bg(), &desired).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_project_without_default() {
        let api = InMemoryApi::new();
        let engine = Reconciler::new(&api, FakeClock::new());

        let err = engine.create(&bg(), &secret_manager()).await.unwrap_err();
        assert!(matches!(
            err,
            RadarError::Config(crate::error::ConfigError::MissingProjectId { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_error_carries_context() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        api.fail_next(RemoteError::api_error(503, "unavailable"));

        let err = engine
            .create(
                &bg(),
                &DesiredState::new(ResourceKind::ScanSource)
                    .with_name("src-1")
                    .with_token("t1"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(err.to_string().contains("create scan-source 'src-1' failed"));
    }

    #[tokio::test]
    async fn test_cancelled_context_issues_no_calls() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let (ctx, handle) = OperationContext::cancellable();
        handle.cancel();

        let err = engine.create(&ctx, &secret_manager()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_blocks_create() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);

        let err = engine
            .create(&bg(), &DesiredState::new(ResourceKind::ScanSource))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_identifier_is_unexpected() {
        let mut api = MockResourceApi::new();
        api.expect_create()
            .times(1)
            .returning(|_, _, _| Ok(String::new()));
        api.expect_get_by_id().never();
        let engine = Reconciler::new(&api, FakeClock::new()).with_default_project(PROJECT);

        let err = engine
            .create(&bg(), &DesiredState::new(ResourceKind::ScanSource).with_token("t1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn test_delete_timeout() {
        let api = InMemoryApi::new().with_offboard_polls(None);
        let engine = reconciler(&api).with_poll_settings(PollSettings {
            timeout: Duration::from_secs(30),
            ..PollSettings::default()
        });
        let created = engine
            .create(&bg(), &DesiredState::new(ResourceKind::ScanSource).with_token("t1"))
            .await
            .unwrap();

        let err = engine.delete(&bg(), &created.instance).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(engine.clock().elapsed() <= Duration::from_secs(30));

        // A retried delete resumes the wait without a second soft delete
        let _ = engine.delete(&bg(), &created.instance).await;
        assert_eq!(soft_deletes(&api), 1);
    }

    #[tokio::test]
    async fn test_import() {
        let api = InMemoryApi::new().with_offboard_polls(Some(5));
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();
        let id = created.instance.external_id();

        let imported = engine
            .import(&bg(), ResourceKind::SecretManager, None, id)
            .await
            .unwrap();
        assert_eq!(imported.name.as_deref(), Some("vault-prod"));
        assert!(imported.auth_fingerprint.is_none());

        let err = engine
            .import(&bg(), ResourceKind::SecretManager, Some(PROJECT), "ext-404")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        api.set_deleted(ResourceKind::SecretManager, id, true);
        let err = engine
            .import(&bg(), ResourceKind::SecretManager, None, id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn test_refresh_keeps_fingerprint() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);
        let created = engine.create(&bg(), &secret_manager()).await.unwrap();

        let refreshed = engine.refresh(&bg(), &created).await.unwrap();

        assert_eq!(
            refreshed.observed().unwrap().auth_fingerprint,
            created.auth_fingerprint
        );
    }

    #[tokio::test]
    async fn test_iam_binding_kind_not_reconciled() {
        let api = InMemoryApi::new();
        let engine = reconciler(&api);

        let err = engine
            .create(&bg(), &DesiredState::new(ResourceKind::IamPolicyBinding))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }
}
