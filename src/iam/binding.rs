//! Policy mode and binding mode.
//!
//! Policy mode replaces the whole binding list. Binding mode merges or removes
//! a single role/principal pair and leaves every other binding alone, so
//! several independent configurations can share one resource's policy.

use tracing::debug;

use crate::context::OperationContext;
use crate::error::{PolicyError, ReconcileError, Result};
use crate::remote::{Policy, PolicyApi, PolicyBinding};
use crate::state::ResourceKind;

use super::lock::{KeyGuard, MutexTable};
use super::updater::IamUpdater;

impl Policy {
    /// Principals holding `role`.
    #[must_use]
    pub fn members_of(&self, role: &str) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.role == role)
            .flat_map(|b| b.principals.iter().map(String::as_str))
            .collect()
    }

    /// Grants `role` to `principal`. Returns false if it was already granted.
    pub fn add_member(&mut self, role: &str, principal: &str) -> bool {
        match self.bindings.iter_mut().find(|b| b.role == role) {
            Some(binding) if binding.principals.iter().any(|p| p == principal) => false,
            Some(binding) => {
                binding.principals.push(principal.to_string());
                true
            }
            None => {
                self.bindings.push(PolicyBinding::new(role, [principal]));
                true
            }
        }
    }

    /// Revokes `role` from `principal`, dropping the binding once empty.
    /// Returns false if the principal did not hold the role.
    pub fn remove_member(&mut self, role: &str, principal: &str) -> bool {
        let mut changed = false;
        for binding in self.bindings.iter_mut().filter(|b| b.role == role) {
            let before = binding.principals.len();
            binding.principals.retain(|p| p != principal);
            changed |= binding.principals.len() != before;
        }
        self.bindings
            .retain(|b| b.role != role || !b.principals.is_empty());
        changed
    }

    /// Merges bindings sharing a role, removes duplicate principals and drops
    /// empty bindings. First-seen order is kept.
    pub fn normalize(&mut self) {
        let mut merged: Vec<PolicyBinding> = Vec::with_capacity(self.bindings.len());
        for binding in self.bindings.drain(..) {
            let target = match merged.iter().position(|b| b.role == binding.role) {
                Some(i) => &mut merged[i],
                None => {
                    merged.push(PolicyBinding::new(binding.role.clone(), Vec::<String>::new()));
                    let last = merged.len() - 1;
                    &mut merged[last]
                }
            };
            for principal in binding.principals {
                if !target.principals.contains(&principal) {
                    target.principals.push(principal);
                }
            }
        }
        merged.retain(|b| !b.principals.is_empty());
        self.bindings = merged;
    }
}

/// Drives policy and binding mode under the per-resource lock.
pub struct PolicyManager<'a, P: PolicyApi + ?Sized> {
    updater: IamUpdater<'a, P>,
    locks: &'a MutexTable,
}

impl<'a, P: PolicyApi + ?Sized> PolicyManager<'a, P> {
    /// Creates a manager using `locks` for mutual exclusion.
    #[must_use]
    pub const fn new(updater: IamUpdater<'a, P>, locks: &'a MutexTable) -> Self {
        Self { updater, locks }
    }

    /// The underlying updater.
    #[must_use]
    pub const fn updater(&self) -> &IamUpdater<'a, P> {
        &self.updater
    }

    /// Reads the current policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is cancelled or the read fails.
    pub async fn policy(&self, ctx: &OperationContext) -> Result<Policy> {
        ctx.check(ResourceKind::IamPolicyBinding, "read policy")?;
        self.updater.get_resource_iam_policy().await
    }

    /// Policy mode: replaces every binding, echoing the current etag.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is cancelled, a role is not allowed,
    /// the policy changed concurrently, or a remote call fails.
    pub async fn replace_policy(
        &self,
        ctx: &OperationContext,
        bindings: Vec<PolicyBinding>,
    ) -> Result<Policy> {
        let _guard = self.acquire(ctx, "replace policy").await?;

        ctx.check(ResourceKind::IamPolicyBinding, "replace policy")?;
        let current = self.updater.get_resource_iam_policy().await?;

        let mut next = Policy {
            etag: current.etag,
            bindings,
        };
        next.normalize();

        ctx.check(ResourceKind::IamPolicyBinding, "replace policy")?;
        self.updater.set_resource_iam_policy(&next).await
    }

    /// Binding mode: grants `role` to `principal`, keeping other bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the role or principal is blank, the context is
    /// cancelled, the role is not allowed, the policy changed concurrently, or
    /// a remote call fails.
    pub async fn add_member(
        &self,
        ctx: &OperationContext,
        role: &str,
        principal: &str,
    ) -> Result<Policy> {
        self.ensure_member(role, principal)?;
        let _guard = self.acquire(ctx, "add member").await?;

        ctx.check(ResourceKind::IamPolicyBinding, "add member")?;
        let mut policy = self.updater.get_resource_iam_policy().await?;
        if !policy.add_member(role, principal) {
            debug!(
                "{principal} already holds {role} on {}",
                self.updater.resource_name()
            );
            return Ok(policy);
        }

        ctx.check(ResourceKind::IamPolicyBinding, "add member")?;
        self.updater.set_resource_iam_policy(&policy).await
    }

    /// Binding mode: revokes `role` from `principal`, keeping other bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the role or principal is blank, the context is
    /// cancelled, the remaining policy is invalid, the policy changed
    /// concurrently, or a remote call fails.
    pub async fn remove_member(
        &self,
        ctx: &OperationContext,
        role: &str,
        principal: &str,
    ) -> Result<Policy> {
        self.ensure_member(role, principal)?;
        let _guard = self.acquire(ctx, "remove member").await?;

        ctx.check(ResourceKind::IamPolicyBinding, "remove member")?;
        let mut policy = self.updater.get_resource_iam_policy().await?;
        if !policy.remove_member(role, principal) {
            debug!(
                "{principal} does not hold {role} on {}",
                self.updater.resource_name()
            );
            return Ok(policy);
        }

        ctx.check(ResourceKind::IamPolicyBinding, "remove member")?;
        self.updater.set_resource_iam_policy(&policy).await
    }

    fn ensure_member(&self, role: &str, principal: &str) -> Result<()> {
        let blank = if role.trim().is_empty() {
            "role"
        } else if principal.trim().is_empty() {
            "principal"
        } else {
            return Ok(());
        };
        Err(PolicyError::InvalidBinding {
            resource_name: self.updater.resource_name().to_string(),
            message: format!("{blank} cannot be empty"),
        }
        .into())
    }

    async fn acquire(&self, ctx: &OperationContext, operation: &str) -> Result<KeyGuard> {
        let key = self.updater.get_mutex_key();
        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(ReconcileError::Cancelled {
                kind: ResourceKind::IamPolicyBinding.to_string(),
                operation: operation.to_string(),
            }
            .into()),
            guard = self.locks.lock(&key) => Ok(guard),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::iam::{IamResourceType, RoleAllowList};
    use crate::remote::{ApiCall, InMemoryApi};
    use async_trait::async_trait;
    use std::time::Duration;

    const VIEWER: &str = "roles/vault-radar.resource-viewer";
    const CONTRIBUTOR: &str = "roles/vault-radar.resource-contributor";
    const RESOURCE: &str = "radar/resource/1";

    fn manager<'a, P: PolicyApi + ?Sized>(api: &'a P, locks: &'a MutexTable) -> PolicyManager<'a, P> {
        let allow_list = RoleAllowList::for_resource_type(IamResourceType::RadarResource);
        PolicyManager::new(IamUpdater::new(api, RESOURCE, allow_list), locks)
    }

    fn set_calls(api: &InMemoryApi) -> usize {
        api.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::SetPolicy { .. }))
            .count()
    }

    // Suspends between the read and the write so two cycles can interleave.
    struct YieldingApi(InMemoryApi);

    #[async_trait]
    impl PolicyApi for YieldingApi {
        async fn get_policy(&self, resource_name: &str) -> Result<Policy> {
            let policy = self.0.get_policy(resource_name).await;
            tokio::task::yield_now().await;
            policy
        }

        async fn set_policy(&self, resource_name: &str, policy: &Policy) -> Result<Policy> {
            self.0.set_policy(resource_name, policy).await
        }
    }

    #[test]
    fn test_merge_preserves_foreign_bindings() {
        let mut policy = Policy {
            etag: String::from("e1"),
            bindings: vec![
                PolicyBinding::new("roleA", ["p1"]),
                PolicyBinding::new("roleB", ["p2"]),
            ],
        };

        assert!(policy.add_member("roleA", "p3"));

        assert_eq!(
            policy.bindings,
            vec![
                PolicyBinding::new("roleA", ["p1", "p3"]),
                PolicyBinding::new("roleB", ["p2"]),
            ]
        );
        assert!(!policy.add_member("roleA", "p3"));
    }

    #[test]
    fn test_remove_drops_empty_binding() {
        let mut policy = Policy {
            etag: String::new(),
            bindings: vec![
                PolicyBinding::new("roleA", ["p1"]),
                PolicyBinding::new("roleB", ["p2", "p3"]),
            ],
        };

        assert!(policy.remove_member("roleA", "p1"));
        assert!(policy.remove_member("roleB", "p2"));
        assert!(!policy.remove_member("roleB", "p9"));

        assert_eq!(policy.bindings, vec![PolicyBinding::new("roleB", ["p3"])]);
        assert_eq!(policy.members_of("roleB"), vec!["p3"]);
        assert!(policy.members_of("roleA").is_empty());
    }

    #[test]
    fn test_normalize() {
        let mut policy = Policy {
            etag: String::new(),
            bindings: vec![
                PolicyBinding::new("roleA", ["p1", "p1"]),
                PolicyBinding::new("roleB", Vec::<String>::new()),
                PolicyBinding::new("roleA", ["p2", "p1"]),
            ],
        };

        policy.normalize();

        assert_eq!(policy.bindings, vec![PolicyBinding::new("roleA", ["p1", "p2"])]);
    }

    #[tokio::test]
    async fn test_add_member_keeps_other_bindings() {
        let api = InMemoryApi::new();
        api.insert_policy(RESOURCE, vec![PolicyBinding::new(CONTRIBUTOR, ["team-a"])]);
        let locks = MutexTable::new();

        let policy = manager(&api, &locks)
            .add_member(&OperationContext::background(), VIEWER, "user-1")
            .await
            .unwrap();

        assert_eq!(policy.members_of(CONTRIBUTOR), vec!["team-a"]);
        assert_eq!(policy.members_of(VIEWER), vec!["user-1"]);
        assert_eq!(api.stored_policy(RESOURCE).unwrap(), policy);
    }

    #[tokio::test]
    async fn test_add_member_creates_first_policy() {
        let api = InMemoryApi::new();
        let locks = MutexTable::new();

        let policy = manager(&api, &locks)
            .add_member(&OperationContext::background(), VIEWER, "user-1")
            .await
            .unwrap();

        assert_eq!(policy.bindings, vec![PolicyBinding::new(VIEWER, ["user-1"])]);
    }

    #[tokio::test]
    async fn test_unchanged_binding_skips_set() {
        let api = InMemoryApi::new();
        api.insert_policy(RESOURCE, vec![PolicyBinding::new(VIEWER, ["user-1"])]);
        let locks = MutexTable::new();
        let manager = manager(&api, &locks);
        let ctx = OperationContext::background();

        manager.add_member(&ctx, VIEWER, "user-1").await.unwrap();
        manager.remove_member(&ctx, CONTRIBUTOR, "user-1").await.unwrap();

        assert_eq!(set_calls(&api), 0);
    }

    #[tokio::test]
    async fn test_remove_member() {
        let api = InMemoryApi::new();
        api.insert_policy(
            RESOURCE,
            vec![
                PolicyBinding::new(VIEWER, ["user-1"]),
                PolicyBinding::new(CONTRIBUTOR, ["team-a"]),
            ],
        );
        let locks = MutexTable::new();

        let policy = manager(&api, &locks)
            .remove_member(&OperationContext::background(), VIEWER, "user-1")
            .await
            .unwrap();

        assert_eq!(policy.bindings, vec![PolicyBinding::new(CONTRIBUTOR, ["team-a"])]);
    }

    #[tokio::test]
    async fn test_replace_policy_uses_current_etag() {
        let api = InMemoryApi::new();
        api.insert_policy(RESOURCE, vec![PolicyBinding::new(VIEWER, ["user-1"])]);
        let locks = MutexTable::new();

        let policy = manager(&api, &locks)
            .replace_policy(
                &OperationContext::background(),
                vec![PolicyBinding::new(CONTRIBUTOR, ["team-a", "team-a"])],
            )
            .await
            .unwrap();

        assert_eq!(policy.bindings, vec![PolicyBinding::new(CONTRIBUTOR, ["team-a"])]);
        assert!(policy.members_of(VIEWER).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_role_releases_lock() {
        let api = InMemoryApi::new();
        let locks = MutexTable::new();
        let manager = manager(&api, &locks);

        let err = manager
            .add_member(&OperationContext::background(), "roles/owner", "user-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(set_calls(&api), 0);

        let key = manager.updater().get_mutex_key();
        let relock = tokio::time::timeout(Duration::from_millis(20), locks.lock(&key)).await;
        assert!(relock.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let api = YieldingApi(InMemoryApi::new());
        let locks = MutexTable::new();
        let first = manager(&api, &locks);
        let second = manager(&api, &locks);
        let ctx = OperationContext::background();

        let (a, b) = tokio::join!(
            first.add_member(&ctx, VIEWER, "user-1"),
            second.add_member(&ctx, VIEWER, "user-2"),
        );
        a.unwrap();
        b.unwrap();

        let stored = api.0.stored_policy(RESOURCE).unwrap();
        assert_eq!(stored.members_of(VIEWER), vec!["user-1", "user-2"]);
    }

    #[tokio::test]
    async fn test_unlocked_cycles_conflict() {
        let api = YieldingApi(InMemoryApi::new());
        let ctx = OperationContext::background();
        let (first_locks, second_locks) = (MutexTable::new(), MutexTable::new());
        let first = manager(&api, &first_locks);
        let second = manager(&api, &second_locks);

        let (a, b) = tokio::join!(
            first.add_member(&ctx, VIEWER, "user-1"),
            second.add_member(&ctx, VIEWER, "user-2"),
        );

        // join! rotates which branch it polls first, so either cycle may win
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| r.as_ref().is_err_and(|e| e.kind() == ErrorKind::Conflict)));
    }

    #[tokio::test]
    async fn test_blank_member_rejected_before_any_call() {
        let api = InMemoryApi::new();
        let locks = MutexTable::new();
        let manager = manager(&api, &locks);
        let ctx = OperationContext::background();

        let err = manager.add_member(&ctx, VIEWER, "  ").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::RadarError::Policy(PolicyError::InvalidBinding { ref message, .. })
                if message == "principal cannot be empty"
        ));

        let err = manager.remove_member(&ctx, "", "user-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("role cannot be empty"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_lock() {
        let api = InMemoryApi::new();
        let locks = MutexTable::new();
        let (ctx, handle) = OperationContext::cancellable();
        handle.cancel();

        let err = manager(&api, &locks)
            .add_member(&ctx, VIEWER, "user-1")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(api.calls().is_empty());
    }
}
