//! Policy versions and their state machine.
//!
//! ```text
//! DRAFT --publish--> PUBLISHED --close--> HISTORICAL
//! ```
//!
//! Only a draft is ever edited. A published version changes exactly once
//! more, when it is closed; the next generation is always a new version.

use crate::criteria::MatchCriteria;
use crate::error::{PolicyError, PolicyResult};
use crate::payload::RulePayload;
use serde::{Deserialize, Serialize};
use stratum_core::{Actor, RootId, Timestamp};

/// Lifecycle status of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    /// Being edited, not effective
    Draft,
    /// The live generation
    Published,
    /// Replaced by a later generation
    Historical,
}

/// Why a version was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    /// First version of a policy
    Create,
    /// Ordinary edit
    Update,
    /// Soft delete
    Delete,
    /// Undo of a soft delete
    Restore,
    /// Pending edit
    Draft,
    /// Draft made live
    Publish,
    /// Copy of an earlier version made live
    Rollback,
}

/// Editable contents of a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFields<P> {
    /// Match criteria
    pub criteria: MatchCriteria,
    /// Rule payload
    pub payload: P,
    /// Free-text reason for the change
    #[serde(default)]
    pub change_reason: Option<String>,
}

impl<P: RulePayload> PolicyFields<P> {
    /// Fields without a change reason
    #[must_use]
    pub fn new(criteria: MatchCriteria, payload: P) -> Self {
        Self {
            criteria,
            payload,
            change_reason: None,
        }
    }

    /// Attach a change reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }
}

/// One generation of a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion<P> {
    root_id: RootId,
    version: u32,
    criteria: MatchCriteria,
    payload: P,
    status: VersionStatus,
    change_action: ChangeAction,
    change_reason: Option<String>,
    changed_by: String,
    changed_by_name: String,
    changed_at: Timestamp,
    valid_from: Timestamp,
    valid_to: Option<Timestamp>,
    rollback_from_version: Option<u32>,
}

impl<P: RulePayload> PolicyVersion<P> {
    /// Create a published version that is open from `now`
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the criteria window is empty
    pub fn create(
        root_id: RootId,
        version: u32,
        fields: PolicyFields<P>,
        action: ChangeAction,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<Self> {
        fields.criteria.validate()?;
        Ok(Self {
            root_id,
            version,
            criteria: fields.criteria,
            payload: fields.payload,
            status: VersionStatus::Published,
            change_action: action,
            change_reason: fields.change_reason,
            changed_by: actor.username.clone(),
            changed_by_name: actor.display_name.clone(),
            changed_at: now,
            valid_from: now,
            valid_to: None,
            rollback_from_version: None,
        })
    }

    /// Create a draft, outside the effective chain
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the criteria window is empty
    pub fn create_draft(
        root_id: RootId,
        version: u32,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<Self> {
        let mut draft = Self::create(root_id, version, fields, ChangeAction::Draft, actor, now)?;
        draft.status = VersionStatus::Draft;
        Ok(draft)
    }

    /// Create a published copy of `target`'s criteria and payload
    #[must_use]
    pub fn create_from_rollback(
        version: u32,
        target: &PolicyVersion<P>,
        reason: Option<String>,
        actor: &Actor,
        now: Timestamp,
    ) -> Self {
        Self {
            root_id: target.root_id,
            version,
            criteria: target.criteria.clone(),
            payload: target.payload.clone(),
            status: VersionStatus::Published,
            change_action: ChangeAction::Rollback,
            change_reason: reason,
            changed_by: actor.username.clone(),
            changed_by_name: actor.display_name.clone(),
            changed_at: now,
            valid_from: now,
            valid_to: None,
            rollback_from_version: Some(target.version),
        }
    }

    /// Make a draft live from `now`
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the version is a draft
    pub fn publish(&mut self, actor: &Actor, now: Timestamp) -> PolicyResult<()> {
        if self.status != VersionStatus::Draft {
            return Err(PolicyError::IllegalState(
                "only a draft may be published".to_string(),
            ));
        }
        self.status = VersionStatus::Published;
        self.change_action = ChangeAction::Publish;
        self.changed_by = actor.username.clone();
        self.changed_by_name = actor.display_name.clone();
        self.valid_from = now;
        self.changed_at = now;
        Ok(())
    }

    /// End the version's validity at `now`
    ///
    /// Published versions become historical. Drafts and already-closed
    /// versions are left untouched.
    pub fn close(&mut self, now: Timestamp) {
        if self.status == VersionStatus::Published && self.valid_to.is_none() {
            self.valid_to = Some(now);
            self.status = VersionStatus::Historical;
        }
    }

    /// Overwrite the contents of a draft
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the version is a draft, or
    /// `Validation` if the new criteria window is empty
    pub fn update_draft(
        &mut self,
        fields: PolicyFields<P>,
        actor: &Actor,
        now: Timestamp,
    ) -> PolicyResult<()> {
        if self.status != VersionStatus::Draft {
            return Err(PolicyError::IllegalState(
                "only a draft may be edited".to_string(),
            ));
        }
        fields.criteria.validate()?;
        self.criteria = fields.criteria;
        self.payload = fields.payload;
        self.change_reason = fields.change_reason;
        self.changed_by = actor.username.clone();
        self.changed_by_name = actor.display_name.clone();
        self.changed_at = now;
        Ok(())
    }

    /// Published and still open
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.status == VersionStatus::Published && self.valid_to.is_none()
    }

    /// Still a draft
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.status == VersionStatus::Draft
    }

    /// Business applicability at `at`
    #[must_use]
    pub fn is_effective_at(&self, at: Timestamp) -> bool {
        self.criteria.is_effective_at(at)
    }

    /// Whether the classification set covers `classification`
    #[must_use]
    pub fn applies_to(&self, classification: Option<&str>) -> bool {
        self.criteria.applies_to(classification)
    }

    /// Whether this was the record of truth at `at`, i.e. `at` lies in
    /// `[valid_from, valid_to)`. Drafts never are.
    #[must_use]
    pub fn was_valid_at(&self, at: Timestamp) -> bool {
        !self.is_draft() && at >= self.valid_from && self.valid_to.is_none_or(|to| at < to)
    }

    /// Copy of the editable contents
    #[must_use]
    pub fn fields(&self) -> PolicyFields<P> {
        PolicyFields {
            criteria: self.criteria.clone(),
            payload: self.payload.clone(),
            change_reason: self.change_reason.clone(),
        }
    }

    /// Owning root
    #[must_use]
    pub fn root_id(&self) -> RootId {
        self.root_id
    }

    /// Version number, starting at 1
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Match criteria
    #[must_use]
    pub fn criteria(&self) -> &MatchCriteria {
        &self.criteria
    }

    /// Rule payload
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Lifecycle status
    #[must_use]
    pub fn status(&self) -> VersionStatus {
        self.status
    }

    /// Recorded change action
    #[must_use]
    pub fn change_action(&self) -> ChangeAction {
        self.change_action
    }

    /// Recorded change reason
    #[must_use]
    pub fn change_reason(&self) -> Option<&str> {
        self.change_reason.as_deref()
    }

    /// Username of the last writer
    #[must_use]
    pub fn changed_by(&self) -> &str {
        &self.changed_by
    }

    /// Display name of the last writer
    #[must_use]
    pub fn changed_by_name(&self) -> &str {
        &self.changed_by_name
    }

    /// Time of the last write
    #[must_use]
    pub fn changed_at(&self) -> Timestamp {
        self.changed_at
    }

    /// Start of the record-validity window
    #[must_use]
    pub fn valid_from(&self) -> Timestamp {
        self.valid_from
    }

    /// End of the record-validity window, `None` while open
    #[must_use]
    pub fn valid_to(&self) -> Option<Timestamp> {
        self.valid_to
    }

    /// Source version number for rollbacks
    #[must_use]
    pub fn rollback_from_version(&self) -> Option<u32> {
        self.rollback_from_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MaskingPayload;
    use stratum_core::FeatureCode;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_millis(secs * 1_000).unwrap()
    }

    fn fields() -> PolicyFields<MaskingPayload> {
        let criteria = MatchCriteria::for_feature(FeatureCode::parse("HR_EMPLOYEE").unwrap());
        PolicyFields::new(criteria, MaskingPayload::masked())
    }

    fn actor() -> Actor {
        Actor::new("kim", "Kim Lee")
    }

    #[test]
    fn test_create_is_published_and_open() {
        let v = PolicyVersion::create(RootId::new(), 1, fields(), ChangeAction::Create, &actor(), ts(5))
            .unwrap();
        assert!(v.is_current());
        assert_eq!(v.valid_from(), ts(5));
        assert_eq!(v.valid_to(), None);
        assert_eq!(v.change_action(), ChangeAction::Create);
        assert_eq!(v.changed_by(), "kim");
        assert_eq!(v.changed_by_name(), "Kim Lee");
    }

    #[test]
    fn test_create_rejects_empty_window() {
        let mut f = fields();
        f.criteria = f.criteria.with_window(Some(ts(9)), Some(ts(1)));
        let result = PolicyVersion::create(RootId::new(), 1, f, ChangeAction::Create, &actor(), ts(0));
        assert!(matches!(result, Err(PolicyError::Validation(_))));
    }

    #[test]
    fn test_draft_publish() {
        let mut d = PolicyVersion::create_draft(RootId::new(), 2, fields(), &actor(), ts(1)).unwrap();
        assert!(d.is_draft());
        assert!(!d.is_current());
        assert_eq!(d.change_action(), ChangeAction::Draft);

        d.publish(&Actor::new("park", "Park"), ts(7)).unwrap();
        assert!(d.is_current());
        assert_eq!(d.change_action(), ChangeAction::Publish);
        assert_eq!(d.valid_from(), ts(7));
        assert_eq!(d.changed_at(), ts(7));
        assert_eq!(d.changed_by(), "park");
    }

    #[test]
    fn test_publish_non_draft_fails() {
        let mut v = PolicyVersion::create(RootId::new(), 1, fields(), ChangeAction::Create, &actor(), ts(0))
            .unwrap();
        let err = v.publish(&actor(), ts(1)).unwrap_err();
        assert_eq!(err, PolicyError::IllegalState("only a draft may be published".to_string()));
        assert_eq!(v.valid_from(), ts(0));
    }

    #[test]
    fn test_close_published_becomes_historical() {
        let mut v = PolicyVersion::create(RootId::new(), 1, fields(), ChangeAction::Create, &actor(), ts(0))
            .unwrap();
        v.close(ts(4));
        assert_eq!(v.status(), VersionStatus::Historical);
        assert_eq!(v.valid_to(), Some(ts(4)));

        // closing twice keeps the first end
        v.close(ts(9));
        assert_eq!(v.valid_to(), Some(ts(4)));
    }

    #[test]
    fn test_close_draft_is_noop() {
        let mut d = PolicyVersion::create_draft(RootId::new(), 1, fields(), &actor(), ts(0)).unwrap();
        d.close(ts(3));
        assert!(d.is_draft());
        assert_eq!(d.valid_to(), None);
    }

    #[test]
    fn test_update_draft_only_on_draft() {
        let mut d = PolicyVersion::create_draft(RootId::new(), 1, fields(), &actor(), ts(0)).unwrap();
        let mut edited = fields().with_reason("tighten");
        edited.criteria.priority = 5;
        edited.payload = MaskingPayload::whitelisted();
        d.update_draft(edited, &actor(), ts(2)).unwrap();
        assert_eq!(d.criteria().priority, 5);
        assert!(!d.payload().masking_enabled);
        assert_eq!(d.change_reason(), Some("tighten"));
        assert_eq!(d.changed_at(), ts(2));

        let mut v = PolicyVersion::create(RootId::new(), 1, fields(), ChangeAction::Create, &actor(), ts(0))
            .unwrap();
        let err = v.update_draft(fields(), &actor(), ts(1)).unwrap_err();
        assert_eq!(err, PolicyError::IllegalState("only a draft may be edited".to_string()));
    }

    #[test]
    fn test_rollback_copies_rule_fields() {
        let mut f = fields();
        f.criteria = f.criteria.with_priority(3).with_classification("SSN");
        let target = PolicyVersion::create(RootId::new(), 2, f, ChangeAction::Update, &actor(), ts(0))
            .unwrap();
        let rb = PolicyVersion::create_from_rollback(6, &target, Some("revert".to_string()), &actor(), ts(8));
        assert_eq!(rb.version(), 6);
        assert_eq!(rb.criteria(), target.criteria());
        assert_eq!(rb.payload(), target.payload());
        assert_eq!(rb.rollback_from_version(), Some(2));
        assert_eq!(rb.change_action(), ChangeAction::Rollback);
        assert_eq!(rb.root_id(), target.root_id());
        assert!(rb.is_current());
    }

    #[test]
    fn test_was_valid_at_half_open() {
        let mut v = PolicyVersion::create(RootId::new(), 1, fields(), ChangeAction::Create, &actor(), ts(10))
            .unwrap();
        assert!(!v.was_valid_at(ts(9)));
        assert!(v.was_valid_at(ts(10)));
        assert!(v.was_valid_at(ts(1_000)));
        v.close(ts(20));
        assert!(v.was_valid_at(ts(19)));
        assert!(!v.was_valid_at(ts(20)));

        let d = PolicyVersion::create_draft(RootId::new(), 2, fields(), &actor(), ts(10)).unwrap();
        assert!(!d.was_valid_at(ts(15)));
    }
}
