//! Match criteria carried by every policy version.

use crate::error::{PolicyError, PolicyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use stratum_core::{ActionCode, FeatureCode, Timestamp};

/// Default priority for new policies
pub const DEFAULT_PRIORITY: i32 = 100;

/// Who and when a version applies to
///
/// `None` on an optional code means "any". Lower `priority` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// Feature the policy governs
    pub feature_code: FeatureCode,
    /// Required action, or any
    #[serde(default)]
    pub action_code: Option<ActionCode>,
    /// Required permission group, or any
    #[serde(default)]
    pub permission_group_code: Option<String>,
    /// Required organization group, or any
    #[serde(default)]
    pub organization_group_code: Option<String>,
    /// Data classifications covered; empty covers all
    #[serde(default)]
    pub classifications: BTreeSet<String>,
    /// Precedence, lower value first
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Soft-delete flag
    #[serde(default = "default_active")]
    pub active: bool,
    /// Business applicability start (inclusive)
    #[serde(default)]
    pub effective_from: Option<Timestamp>,
    /// Business applicability end (exclusive)
    #[serde(default)]
    pub effective_to: Option<Timestamp>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

impl MatchCriteria {
    /// Criteria matching every caller of `feature_code`
    #[must_use]
    pub fn for_feature(feature_code: FeatureCode) -> Self {
        Self {
            feature_code,
            action_code: None,
            permission_group_code: None,
            organization_group_code: None,
            classifications: BTreeSet::new(),
            priority: DEFAULT_PRIORITY,
            active: true,
            effective_from: None,
            effective_to: None,
        }
    }

    /// Restrict to an action
    #[must_use]
    pub fn with_action(mut self, action: ActionCode) -> Self {
        self.action_code = Some(action);
        self
    }

    /// Restrict to a permission group
    #[must_use]
    pub fn with_permission_group(mut self, group: impl Into<String>) -> Self {
        self.permission_group_code = Some(group.into());
        self
    }

    /// Restrict to an organization group
    #[must_use]
    pub fn with_org_group(mut self, group: impl Into<String>) -> Self {
        self.organization_group_code = Some(group.into());
        self
    }

    /// Add a covered classification
    #[must_use]
    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classifications.insert(classification.into());
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the business effective window
    #[must_use]
    pub fn with_window(mut self, from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        self.effective_from = from;
        self.effective_to = to;
        self
    }

    /// Reject windows that can never be effective
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `effective_from >= effective_to`
    pub fn validate(&self) -> PolicyResult<()> {
        if let (Some(from), Some(to)) = (self.effective_from, self.effective_to) {
            if from >= to {
                return Err(PolicyError::Validation(format!(
                    "effective window is empty: {} >= {}",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Active and inside `[effective_from, effective_to)` at `at`
    #[must_use]
    pub fn is_effective_at(&self, at: Timestamp) -> bool {
        self.active
            && self.effective_from.is_none_or(|from| at >= from)
            && self.effective_to.is_none_or(|to| at < to)
    }

    /// Whether the classification set covers `classification`
    #[must_use]
    pub fn applies_to(&self, classification: Option<&str>) -> bool {
        self.classifications.is_empty()
            || classification.is_some_and(|c| self.classifications.contains(c))
    }

    /// A constrained action never matches an unspecified query action
    #[must_use]
    pub fn matches_action(&self, action: Option<ActionCode>) -> bool {
        match self.action_code {
            None => true,
            Some(required) => action == Some(required),
        }
    }

    /// Case-insensitive permission group match
    #[must_use]
    pub fn matches_permission_group(&self, group: Option<&str>) -> bool {
        match &self.permission_group_code {
            None => true,
            Some(required) => group.is_some_and(|g| g.eq_ignore_ascii_case(required)),
        }
    }

    /// Case-insensitive membership of the required organization group
    #[must_use]
    pub fn matches_org_groups(&self, groups: &[String]) -> bool {
        match &self.organization_group_code {
            None => true,
            Some(required) => groups.iter().any(|g| g.eq_ignore_ascii_case(required)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature() -> FeatureCode {
        FeatureCode::parse("HR_EMPLOYEE").unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_millis(secs * 1_000).unwrap()
    }

    #[test]
    fn test_effective_window_bounds() {
        let c = MatchCriteria::for_feature(feature()).with_window(Some(ts(10)), Some(ts(20)));
        assert!(!c.is_effective_at(ts(9)));
        assert!(c.is_effective_at(ts(10)));
        assert!(c.is_effective_at(ts(19)));
        assert!(!c.is_effective_at(ts(20)));
    }

    #[test]
    fn test_unbounded_window_and_inactive() {
        let mut c = MatchCriteria::for_feature(feature());
        assert!(c.is_effective_at(ts(0)));
        c.active = false;
        assert!(!c.is_effective_at(ts(0)));
    }

    #[test]
    fn test_validate_empty_window() {
        let c = MatchCriteria::for_feature(feature()).with_window(Some(ts(20)), Some(ts(20)));
        assert!(matches!(c.validate(), Err(PolicyError::Validation(_))));
        let c = MatchCriteria::for_feature(feature()).with_window(Some(ts(20)), None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_empty_classifications_apply_to_everything() {
        let c = MatchCriteria::for_feature(feature());
        assert!(c.applies_to(Some("SSN")));
        assert!(c.applies_to(None));
    }

    #[test]
    fn test_classification_set_requires_member() {
        let c = MatchCriteria::for_feature(feature()).with_classification("SSN");
        assert!(c.applies_to(Some("SSN")));
        assert!(!c.applies_to(Some("PHONE")));
        assert!(!c.applies_to(None));
    }

    #[test]
    fn test_action_constraint() {
        let any = MatchCriteria::for_feature(feature());
        assert!(any.matches_action(None));
        assert!(any.matches_action(Some(ActionCode::Export)));

        let read = MatchCriteria::for_feature(feature()).with_action(ActionCode::Read);
        assert!(read.matches_action(Some(ActionCode::Read)));
        assert!(!read.matches_action(Some(ActionCode::Export)));
        assert!(!read.matches_action(None));
    }

    #[test]
    fn test_group_matching_ignores_case() {
        let c = MatchCriteria::for_feature(feature())
            .with_permission_group("HR_Admin")
            .with_org_group("Seoul");
        assert!(c.matches_permission_group(Some("hr_admin")));
        assert!(!c.matches_permission_group(None));
        assert!(c.matches_org_groups(&["BUSAN".to_string(), "SEOUL".to_string()]));
        assert!(!c.matches_org_groups(&[]));
    }

    #[test]
    fn test_deserialize_defaults() {
        let c: MatchCriteria = serde_json::from_str(r#"{"feature_code": "HR_EMPLOYEE"}"#).unwrap();
        assert_eq!(c.priority, DEFAULT_PRIORITY);
        assert!(c.active);
        assert!(c.classifications.is_empty());
    }
}
