//! Version lifecycle service.
//!
//! Every write loads a root snapshot, applies one close-then-activate step
//! to a private copy and saves it back under the root's mutex. A failed
//! step leaves the stored root untouched.

use crate::locks::RootLocks;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use stratum_core::{Actor, PolicyCode, RootId, Timestamp};
use stratum_policy::{
    ChangeAction, PolicyError, PolicyFields, PolicyResult, PolicyRoot, PolicyVersion, RulePayload,
};
use stratum_storage::PolicyStore;

/// Lifecycle configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Prefix for generated policy codes, defaults to the payload family's
    pub code_prefix: Option<String>,
    /// Reject rollbacks without a reason
    pub require_rollback_reason: bool,
}

/// Creates, publishes, rolls back and reads policy versions
pub struct VersionLifecycleService<P, S> {
    store: Arc<S>,
    config: LifecycleConfig,
    locks: RootLocks,
    _payload: PhantomData<fn() -> P>,
}

impl<P: RulePayload, S: PolicyStore<P>> VersionLifecycleService<P, S> {
    /// Create a service over `store`
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, LifecycleConfig::default())
    }

    /// Create with custom configuration
    #[must_use]
    pub fn with_config(store: Arc<S>, config: LifecycleConfig) -> Self {
        Self {
            store,
            config,
            locks: RootLocks::new(),
            _payload: PhantomData,
        }
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a policy and its first version
    ///
    /// `code` of `None` generates one.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCode` if `code` is taken, or a core error if it
    /// does not parse
    pub fn create_policy(
        &self,
        code: Option<&str>,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<Arc<PolicyRoot<P>>> {
        let mut root = match code {
            Some(code) => PolicyRoot::create_with_code(PolicyCode::parse(code)?, now),
            None => PolicyRoot::create(self.code_prefix(), now)?,
        };
        self.create_initial_version(&mut root, fields, actor, now)?;
        let saved = self.store.insert_root(root)?;
        tracing::info!(
            family = P::FAMILY,
            code = %saved.code(),
            root = %saved.id(),
            actor = %actor.username,
            "created policy"
        );
        Ok(saved)
    }

    /// Install version 1 on an empty root
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the root already has versions
    pub fn create_initial_version(
        &self,
        root: &mut PolicyRoot<P>,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        if root.max_version_number() != 0 {
            return Err(PolicyError::IllegalState(format!(
                "{} already has versions",
                root.code()
            )));
        }
        let version = PolicyVersion::create(root.id(), 1, fields, ChangeAction::Create, actor, now)?;
        root.activate_new_version(version.clone(), now)?;
        Ok(version)
    }

    /// Replace the current version with an edited one
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root, or `Conflict` if another
    /// writer saved first
    pub fn create_update_version(
        &self,
        id: RootId,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "update", |root| {
            let number = root.next_version_number();
            let version =
                PolicyVersion::create(root.id(), number, fields, ChangeAction::Update, actor, now)?;
            root.close_current(now);
            root.activate_new_version(version.clone(), now)?;
            Ok(version)
        })
    }

    /// Soft-delete: a new version identical to current but inactive
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the root or its current version is missing,
    /// or `IllegalState` if the policy is already deleted
    pub fn create_delete_version(
        &self,
        id: RootId,
        reason: Option<String>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "delete", |root| {
            Self::replace_active_flag(root, false, ChangeAction::Delete, reason, actor, now)
        })
    }

    /// Undo a soft delete
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the root or its current version is missing,
    /// or `IllegalState` if the policy is not deleted
    pub fn create_restore_version(
        &self,
        id: RootId,
        reason: Option<String>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "restore", |root| {
            Self::replace_active_flag(root, true, ChangeAction::Restore, reason, actor, now)
        })
    }

    fn replace_active_flag(
        root: &mut PolicyRoot<P>,
        active: bool,
        action: ChangeAction,
        reason: Option<String>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        let current = root
            .current()
            .ok_or_else(|| PolicyError::not_found("current version", root.id()))?;
        if current.criteria().active == active {
            let state = if active { "active" } else { "deleted" };
            return Err(PolicyError::IllegalState(format!(
                "{} is already {}",
                root.code(),
                state
            )));
        }
        let mut fields = current.fields();
        fields.criteria.active = active;
        fields.change_reason = reason;

        let number = root.next_version_number();
        let version = PolicyVersion::create(root.id(), number, fields, action, actor, now)?;
        root.close_current(now);
        root.activate_new_version(version.clone(), now)?;
        Ok(version)
    }

    /// Create or edit the root's draft
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root, or `Validation` for an
    /// empty effective window
    pub fn save_draft(
        &self,
        id: RootId,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "save_draft", |root| {
            if let Some(draft) = root.draft_mut() {
                draft.update_draft(fields, actor, now)?;
                return Ok(draft.clone());
            }
            let number = root.next_version_number();
            let draft = PolicyVersion::create_draft(root.id(), number, fields, actor, now)?;
            root.set_draft_version(draft.clone())?;
            Ok(draft)
        })
    }

    /// Publish the root's draft
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if there is no draft, or `NotFound` for an
    /// unknown root
    pub fn publish_draft(&self, id: RootId, actor: &Actor, now: Timestamp) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "publish", |root| {
            let number = root.publish_draft(actor, now)?;
            root.version(number)
                .cloned()
                .ok_or_else(|| PolicyError::not_found("version", format!("{}#{}", id, number)))
        })
    }

    /// Throw the root's draft away
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the root or its draft is missing
    pub fn discard_draft(&self, id: RootId) -> PolicyResult<PolicyVersion<P>> {
        self.mutate(id, "discard", |root| {
            root.discard_draft()
                .ok_or_else(|| PolicyError::not_found("draft", id))
        })
    }

    /// Make a copy of an earlier version current
    ///
    /// The copy always takes a fresh version number.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the target version is missing, or
    /// `IllegalState` if it is already current
    pub fn rollback_to_version(
        &self,
        id: RootId,
        target: u32,
        reason: Option<String>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<PolicyVersion<P>> {
        if self.config.require_rollback_reason
            && reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(PolicyError::Validation(
                "rollback requires a reason".to_string(),
            ));
        }

        self.mutate(id, "rollback", |root| {
            if root.current_version_number() == Some(target) {
                return Err(PolicyError::IllegalState(format!(
                    "version {} is already current",
                    target
                )));
            }
            let number = root.next_version_number();
            let source = root
                .version(target)
                .filter(|v| !v.is_draft())
                .ok_or_else(|| PolicyError::not_found("version", format!("{}#{}", id, target)))?;
            let version = PolicyVersion::create_from_rollback(number, source, reason, actor, now);
            root.close_current(now);
            root.activate_new_version(version.clone(), now)?;
            Ok(version)
        })
    }

    /// Find a policy by id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root
    pub fn get_policy(&self, id: RootId) -> PolicyResult<Arc<PolicyRoot<P>>> {
        self.store
            .find_root(id)?
            .ok_or_else(|| PolicyError::not_found("root", id))
    }

    /// Find a policy by code
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown code
    pub fn get_policy_by_code(&self, code: &str) -> PolicyResult<Arc<PolicyRoot<P>>> {
        let parsed = PolicyCode::parse(code)?;
        self.store
            .find_root_by_code(&parsed)?
            .ok_or_else(|| PolicyError::not_found("policy", code))
    }

    /// All policies, ordered by code
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    pub fn list_policies(&self) -> PolicyResult<Vec<Arc<PolicyRoot<P>>>> {
        self.store.find_all_roots()
    }

    /// Non-draft versions, most recent first
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root
    pub fn get_version_history(&self, id: RootId) -> PolicyResult<Vec<PolicyVersion<P>>> {
        Ok(self.get_policy(id)?.history().cloned().collect())
    }

    /// Exact version
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root or version
    pub fn get_version(&self, id: RootId, number: u32) -> PolicyResult<PolicyVersion<P>> {
        self.get_policy(id)?;
        self.store
            .find_version(id, number)?
            .ok_or_else(|| PolicyError::not_found("version", format!("{}#{}", id, number)))
    }

    /// Version that was the record of truth at `at`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root or if no version covers `at`
    pub fn get_version_as_of(&self, id: RootId, at: Timestamp) -> PolicyResult<PolicyVersion<P>> {
        self.get_policy(id)?;
        self.store
            .find_version_as_of(id, at)?
            .ok_or_else(|| PolicyError::not_found("version", format!("{}@{}", id, at)))
    }

    /// Pending draft
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root or if there is no draft
    pub fn get_draft(&self, id: RootId) -> PolicyResult<PolicyVersion<P>> {
        self.get_policy(id)?;
        self.store
            .find_draft(id)?
            .ok_or_else(|| PolicyError::not_found("draft", id))
    }

    fn code_prefix(&self) -> &str {
        self.config.code_prefix.as_deref().unwrap_or(P::CODE_PREFIX)
    }

    fn mutate<T>(
        &self,
        id: RootId,
        op: &'static str,
        apply: impl FnOnce(&mut PolicyRoot<P>) -> PolicyResult<T>,
    ) -> PolicyResult<T> {
        let lock = self.locks.lock_for(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| PolicyError::Storage(format!("lock for {} poisoned", id)))?;

        let snapshot = self
            .store
            .find_root(id)?
            .ok_or_else(|| PolicyError::not_found("root", id))?;
        let mut root = (*snapshot).clone();
        let out = apply(&mut root)?;
        let saved = self.store.save_root(root)?;

        tracing::info!(
            family = P::FAMILY,
            op,
            code = %saved.code(),
            current = ?saved.current_version_number(),
            draft = saved.has_draft(),
            revision = saved.revision(),
            "policy mutated"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::{Clock, FeatureCode, ManualClock};
    use stratum_policy::{MaskingPayload, MatchCriteria, RowScope, VersionStatus};
    use stratum_storage::MemoryPolicyStore;

    type Service = VersionLifecycleService<MaskingPayload, MemoryPolicyStore<MaskingPayload>>;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_millis(secs * 1_000).unwrap()
    }

    fn actor() -> Actor {
        Actor::new("kim", "Kim Lee")
    }

    fn fields(priority: i32) -> PolicyFields<MaskingPayload> {
        let criteria = MatchCriteria::for_feature(FeatureCode::parse("HR_EMPLOYEE").unwrap())
            .with_priority(priority);
        PolicyFields::new(criteria, MaskingPayload::masked())
    }

    fn service() -> Service {
        VersionLifecycleService::new(Arc::new(MemoryPolicyStore::new()))
    }

    fn created(service: &Service) -> RootId {
        service
            .create_policy(Some("MSK-HR"), fields(10), &actor(), ts(0))
            .unwrap()
            .id()
    }

    #[test]
    fn test_create_policy_initial_version() {
        let service = service();
        let id = created(&service);
        let root = service.get_policy(id).unwrap();
        let current = root.current().unwrap();
        assert_eq!(current.version(), 1);
        assert_eq!(current.change_action(), ChangeAction::Create);
        assert!(root.is_active());
        assert_eq!(service.get_policy_by_code("MSK-HR").unwrap().id(), id);
    }

    #[test]
    fn test_create_policy_generated_code() {
        let service = service();
        let root = service.create_policy(None, fields(1), &actor(), ts(0)).unwrap();
        assert!(root.code().as_str().starts_with("MSK-"));

        let custom = VersionLifecycleService::<MaskingPayload, _>::with_config(
            Arc::new(MemoryPolicyStore::new()),
            LifecycleConfig {
                code_prefix: Some("HRMASK".to_string()),
                ..Default::default()
            },
        );
        let root = custom.create_policy(None, fields(1), &actor(), ts(0)).unwrap();
        assert!(root.code().as_str().starts_with("HRMASK-"));
    }

    #[test]
    fn test_create_policy_duplicate_code() {
        let service = service();
        created(&service);
        let err = service
            .create_policy(Some("MSK-HR"), fields(1), &actor(), ts(1))
            .unwrap_err();
        assert_eq!(err, PolicyError::DuplicateCode("MSK-HR".to_string()));
        assert_eq!(service.list_policies().unwrap().len(), 1);
    }

    #[test]
    fn test_create_initial_version_twice_fails() {
        let service = service();
        let mut root = PolicyRoot::create_with_code(PolicyCode::parse("X").unwrap(), ts(0));
        service.create_initial_version(&mut root, fields(1), &actor(), ts(0)).unwrap();
        assert!(matches!(
            service.create_initial_version(&mut root, fields(1), &actor(), ts(0)),
            Err(PolicyError::IllegalState(_))
        ));
    }

    #[test]
    fn test_update_closes_current() {
        let service = service();
        let id = created(&service);
        let v2 = service.create_update_version(id, fields(20), &actor(), ts(5)).unwrap();
        assert_eq!(v2.version(), 2);
        assert_eq!(v2.change_action(), ChangeAction::Update);

        let v1 = service.get_version(id, 1).unwrap();
        assert_eq!(v1.status(), VersionStatus::Historical);
        assert_eq!(v1.valid_to(), Some(ts(5)));
        assert!(service.get_policy(id).unwrap().can_rollback());
    }

    #[test]
    fn test_update_unknown_root() {
        let service = service();
        let err = service
            .create_update_version(RootId::new(), fields(1), &actor(), ts(1))
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotFound { kind: "root", .. }));
    }

    #[test]
    fn test_delete_and_restore() {
        let service = service();
        let id = created(&service);

        let deleted = service
            .create_delete_version(id, Some("retired".to_string()), &actor(), ts(1))
            .unwrap();
        assert_eq!(deleted.version(), 2);
        assert!(!deleted.criteria().active);
        assert_eq!(deleted.change_action(), ChangeAction::Delete);
        assert_eq!(deleted.change_reason(), Some("retired"));
        assert_eq!(deleted.criteria().priority, 10);
        assert!(!service.get_policy(id).unwrap().is_active());

        let again = service.create_delete_version(id, None, &actor(), ts(2));
        assert!(matches!(again, Err(PolicyError::IllegalState(_))));

        let restored = service.create_restore_version(id, None, &actor(), ts(3)).unwrap();
        assert_eq!(restored.version(), 3);
        assert!(restored.criteria().active);
        assert_eq!(restored.change_action(), ChangeAction::Restore);
        assert!(service.get_policy(id).unwrap().is_active());

        let again = service.create_restore_version(id, None, &actor(), ts(4));
        assert!(matches!(again, Err(PolicyError::IllegalState(_))));
    }

    #[test]
    fn test_save_draft_create_then_edit() {
        let service = service();
        let id = created(&service);

        let draft = service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();
        assert_eq!(draft.version(), 2);
        assert!(draft.is_draft());

        let edited = service.save_draft(id, fields(6), &actor(), ts(2)).unwrap();
        assert_eq!(edited.version(), 2);
        assert_eq!(edited.criteria().priority, 6);

        let root = service.get_policy(id).unwrap();
        assert_eq!(root.current_version_number(), Some(1));
        assert_eq!(service.get_draft(id).unwrap().criteria().priority, 6);
        root.verify().unwrap();
    }

    #[test]
    fn test_publish_draft() {
        let service = service();
        let id = created(&service);
        service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();

        let published = service.publish_draft(id, &actor(), ts(4)).unwrap();
        assert_eq!(published.version(), 2);
        assert_eq!(published.change_action(), ChangeAction::Publish);
        assert_eq!(published.valid_from(), ts(4));

        let history: Vec<u32> = service
            .get_version_history(id)
            .unwrap()
            .iter()
            .map(PolicyVersion::version)
            .collect();
        assert_eq!(history, vec![2, 1]);
        assert!(matches!(
            service.get_draft(id),
            Err(PolicyError::NotFound { kind: "draft", .. })
        ));
    }

    #[test]
    fn test_publish_without_draft_is_illegal_and_changes_nothing() {
        let service = service();
        let id = created(&service);
        let before = service.get_policy(id).unwrap();

        let err = service.publish_draft(id, &actor(), ts(3)).unwrap_err();
        assert_eq!(err, PolicyError::IllegalState("no draft to publish".to_string()));

        let after = service.get_policy(id).unwrap();
        assert_eq!(before.revision(), after.revision());
        assert_eq!(*before, *after);
    }

    #[test]
    fn test_discard_draft_twice() {
        let service = service();
        let id = created(&service);
        service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();

        let discarded = service.discard_draft(id).unwrap();
        assert_eq!(discarded.version(), 2);
        let err = service.discard_draft(id).unwrap_err();
        assert!(matches!(err, PolicyError::NotFound { kind: "draft", .. }));
        assert!(!service.get_policy(id).unwrap().has_draft());
        assert_eq!(service.get_policy(id).unwrap().current_version_number(), Some(1));
    }

    #[test]
    fn test_discarded_draft_number_goes_to_next_generation() {
        let service = service();
        let id = created(&service);
        service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();
        service.discard_draft(id).unwrap();

        let redrafted = service.save_draft(id, fields(6), &actor(), ts(2)).unwrap();
        assert_eq!(redrafted.version(), 2);
        service.discard_draft(id).unwrap();

        let v2 = service.create_update_version(id, fields(7), &actor(), ts(3)).unwrap();
        assert_eq!(v2.version(), 2);
        let numbers: Vec<_> = service
            .get_version_history(id)
            .unwrap()
            .iter()
            .map(PolicyVersion::version)
            .collect();
        assert_eq!(numbers, vec![2, 1]);
    }

    #[test]
    fn test_manual_clock_drives_generations() {
        let clock = ManualClock::new(ts(100));
        let service = service();
        let id = service
            .create_policy(Some("MSK-CLOCK"), fields(10), &actor(), clock.now())
            .unwrap()
            .id();
        clock.advance_secs(60);
        service.create_update_version(id, fields(20), &actor(), clock.now()).unwrap();
        clock.advance_secs(60);
        service.create_delete_version(id, None, &actor(), clock.now()).unwrap();

        assert_eq!(service.get_version_as_of(id, ts(130)).unwrap().version(), 1);
        assert_eq!(service.get_version_as_of(id, ts(190)).unwrap().version(), 2);
        let deleted = service.get_version_as_of(id, clock.now()).unwrap();
        assert_eq!(deleted.version(), 3);
        assert_eq!(deleted.valid_from(), ts(220));
    }

    #[test]
    fn test_update_consumes_pending_draft() {
        let service = service();
        let id = created(&service);
        service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();
        let v2 = service.create_update_version(id, fields(7), &actor(), ts(2)).unwrap();
        assert_eq!(v2.version(), 2);

        let root = service.get_policy(id).unwrap();
        assert!(!root.has_draft());
        root.verify().unwrap();
    }

    #[test]
    fn test_rollback_round_trip() {
        let service = service();
        let id = created(&service);
        service.create_update_version(id, fields(20), &actor(), ts(1)).unwrap();
        service.create_update_version(id, fields(30), &actor(), ts(2)).unwrap();
        let previous_max = service.get_policy(id).unwrap().max_version_number();

        let rolled = service
            .rollback_to_version(id, 1, Some("bad change".to_string()), &actor(), ts(3))
            .unwrap();
        let target = service.get_version(id, 1).unwrap();

        assert_eq!(rolled.version(), previous_max + 1);
        assert_eq!(rolled.rollback_from_version(), Some(1));
        assert_eq!(rolled.criteria(), target.criteria());
        assert_eq!(rolled.payload(), target.payload());
        assert_eq!(rolled.change_action(), ChangeAction::Rollback);
        assert_eq!(
            service.get_policy(id).unwrap().previous().map(PolicyVersion::version),
            Some(3)
        );
    }

    #[test]
    fn test_rollback_missing_or_current_target() {
        let service = service();
        let id = created(&service);
        service.create_update_version(id, fields(20), &actor(), ts(1)).unwrap();

        let missing = service.rollback_to_version(id, 9, None, &actor(), ts(2));
        assert!(matches!(missing, Err(PolicyError::NotFound { kind: "version", .. })));

        let current = service.rollback_to_version(id, 2, None, &actor(), ts(2));
        assert!(matches!(current, Err(PolicyError::IllegalState(_))));
    }

    #[test]
    fn test_rollback_to_draft_number_not_found() {
        let service = service();
        let id = created(&service);
        service.save_draft(id, fields(5), &actor(), ts(1)).unwrap();
        let result = service.rollback_to_version(id, 2, None, &actor(), ts(2));
        assert!(matches!(result, Err(PolicyError::NotFound { .. })));
    }

    #[test]
    fn test_rollback_reason_required_by_config() {
        let service = VersionLifecycleService::<MaskingPayload, _>::with_config(
            Arc::new(MemoryPolicyStore::new()),
            LifecycleConfig {
                require_rollback_reason: true,
                ..Default::default()
            },
        );
        let id = created(&service);
        service.create_update_version(id, fields(20), &actor(), ts(1)).unwrap();
        assert!(matches!(
            service.rollback_to_version(id, 1, Some("  ".to_string()), &actor(), ts(2)),
            Err(PolicyError::Validation(_))
        ));
        assert!(service
            .rollback_to_version(id, 1, Some("revert".to_string()), &actor(), ts(2))
            .is_ok());
    }

    #[test]
    fn test_version_as_of() {
        let service = service();
        let id = created(&service);
        service.create_update_version(id, fields(20), &actor(), ts(10)).unwrap();

        assert_eq!(service.get_version_as_of(id, ts(5)).unwrap().version(), 1);
        assert_eq!(service.get_version_as_of(id, ts(10)).unwrap().version(), 2);
        assert!(matches!(
            service.get_version_as_of(id, ts(-5)),
            Err(PolicyError::NotFound { kind: "version", .. })
        ));
    }

    #[test]
    fn test_get_version_unknown() {
        let service = service();
        let id = created(&service);
        assert!(matches!(
            service.get_version(id, 4),
            Err(PolicyError::NotFound { kind: "version", .. })
        ));
        assert!(matches!(
            service.get_version(RootId::new(), 1),
            Err(PolicyError::NotFound { kind: "root", .. })
        ));
    }

    #[test]
    fn test_row_scope_family_uses_same_engine() {
        let service: VersionLifecycleService<RowScope, MemoryPolicyStore<RowScope>> =
            VersionLifecycleService::new(Arc::new(MemoryPolicyStore::new()));
        let criteria = MatchCriteria::for_feature(FeatureCode::parse("CRM_CUSTOMER").unwrap());
        let root = service
            .create_policy(None, PolicyFields::new(criteria.clone(), RowScope::Org), &actor(), ts(0))
            .unwrap();
        assert!(root.code().as_str().starts_with("ROW-"));

        let v2 = service
            .create_update_version(root.id(), PolicyFields::new(criteria, RowScope::All), &actor(), ts(1))
            .unwrap();
        assert_eq!(*v2.payload(), RowScope::All);
        let rolled = service.rollback_to_version(root.id(), 1, None, &actor(), ts(2)).unwrap();
        assert_eq!(*rolled.payload(), RowScope::Org);
    }

    #[test]
    fn test_concurrent_writers_same_root() {
        let service = Arc::new(service());
        let id = created(&service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    service
                        .create_update_version(id, fields(i), &actor(), ts(i64::from(i) + 1))
                        .unwrap()
                        .version()
                })
            })
            .collect();
        let mut numbers: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        numbers.sort_unstable();

        assert_eq!(numbers, (2..=9).collect::<Vec<u32>>());
        service.get_policy(id).unwrap().verify().unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Update(i32),
        Delete,
        Restore,
        SaveDraft(i32),
        Publish,
        Discard,
        Rollback(u32),
    }

    fn op() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        prop_oneof![
            (0..50i32).prop_map(Op::Update),
            Just(Op::Delete),
            Just(Op::Restore),
            (0..50i32).prop_map(Op::SaveDraft),
            Just(Op::Publish),
            Just(Op::Discard),
            (1..12u32).prop_map(Op::Rollback),
        ]
    }

    proptest::proptest! {
        #[test]
        fn prop_lifecycle_keeps_invariants(ops in proptest::collection::vec(op(), 1..40)) {
            let service = service();
            let id = created(&service);

            for (step, op) in ops.into_iter().enumerate() {
                let now = ts(step as i64 + 1);
                let before = service.get_policy(id).unwrap();
                let result = match op {
                    Op::Update(p) => service.create_update_version(id, fields(p), &actor(), now).map(|_| ()),
                    Op::Delete => service.create_delete_version(id, None, &actor(), now).map(|_| ()),
                    Op::Restore => service.create_restore_version(id, None, &actor(), now).map(|_| ()),
                    Op::SaveDraft(p) => service.save_draft(id, fields(p), &actor(), now).map(|_| ()),
                    Op::Publish => service.publish_draft(id, &actor(), now).map(|_| ()),
                    Op::Discard => service.discard_draft(id).map(|_| ()),
                    Op::Rollback(n) => service.rollback_to_version(id, n, None, &actor(), now).map(|_| ()),
                };
                let after = service.get_policy(id).unwrap();

                after.verify().unwrap();
                if result.is_err() {
                    proptest::prop_assert_eq!(&*before, &*after);
                }
                if !before.has_draft() && matches!(result, Err(PolicyError::IllegalState(ref m)) if m == "no draft to publish") {
                    proptest::prop_assert_eq!(before.revision(), after.revision());
                }

                let history: Vec<u32> = after.history().map(PolicyVersion::version).collect();
                let expected: Vec<u32> = (1..=history.len() as u32).rev().collect();
                proptest::prop_assert_eq!(history, expected);
                proptest::prop_assert!(after.max_version_number() >= before.history().count() as u32);
            }
        }
    }
}
