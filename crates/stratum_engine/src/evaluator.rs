//! Priority-ordered policy evaluation.
//!
//! Evaluation never fails: every problem with the query, the caller
//! context or the store degrades to [`Evaluation::NoMatch`], and callers
//! then apply the payload's most restrictive rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use stratum_core::{ActionCode, CallerContext, ContextProvider, FeatureCode, PolicyCode, RootId, Timestamp};
use stratum_policy::RulePayload;
use stratum_storage::{ActiveVersion, PolicyStore};

/// One runtime access request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuery {
    /// Feature being accessed, unparsed
    pub feature_code: String,
    /// Action being performed, unparsed
    #[serde(default)]
    pub action_code: Option<String>,
    /// Caller's permission group
    #[serde(default)]
    pub permission_group_code: Option<String>,
    /// Caller's organization groups
    #[serde(default)]
    pub organization_group_codes: Vec<String>,
    /// Data classification of the value being accessed
    #[serde(default)]
    pub classification: Option<String>,
    /// Evaluation instant
    pub timestamp: Timestamp,
}

impl PolicyQuery {
    /// Query for `feature` at `timestamp` with every other criterion unset
    pub fn new(feature: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            feature_code: feature.into(),
            action_code: None,
            permission_group_code: None,
            organization_group_codes: Vec::new(),
            classification: None,
            timestamp,
        }
    }

    /// Build from a resolved caller context
    #[must_use]
    pub fn from_context(context: &CallerContext, classification: Option<&str>, at: Timestamp) -> Self {
        Self {
            feature_code: context.feature_code.clone(),
            action_code: context.action_code.clone(),
            permission_group_code: context.permission_group_code.clone(),
            organization_group_codes: context.organization_group_codes.clone(),
            classification: classification.map(str::to_string),
            timestamp: at,
        }
    }

    /// Set the action
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_code = Some(action.into());
        self
    }

    /// Set the permission group
    #[must_use]
    pub fn with_permission_group(mut self, group: impl Into<String>) -> Self {
        self.permission_group_code = Some(group.into());
        self
    }

    /// Add an organization group
    #[must_use]
    pub fn with_org_group(mut self, group: impl Into<String>) -> Self {
        self.organization_group_codes.push(group.into());
        self
    }

    /// Set the classification
    #[must_use]
    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }
}

/// The winning version of an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyMatch<P> {
    /// Owning root
    pub root_id: RootId,
    /// Owning root's code
    pub policy_code: PolicyCode,
    /// Matched version number
    pub version: u32,
    /// Matched version's priority
    pub priority: i32,
    /// Rule to apply
    pub payload: P,
}

/// Why nothing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoMatchReason {
    /// Feature code was blank or malformed
    InvalidFeature,
    /// Action code was not a known action
    InvalidAction,
    /// No caller context could be resolved
    MissingContext,
    /// No active version satisfied every criterion
    NoCandidate,
    /// The store could not be read
    StoreUnavailable,
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoMatchReason::InvalidFeature => "invalid feature code",
            NoMatchReason::InvalidAction => "invalid action code",
            NoMatchReason::MissingContext => "missing caller context",
            NoMatchReason::NoCandidate => "no matching policy",
            NoMatchReason::StoreUnavailable => "policy store unavailable",
        };
        f.write_str(s)
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Evaluation<P> {
    /// A version matched
    Matched(PolicyMatch<P>),
    /// Nothing matched
    NoMatch(NoMatchReason),
}

impl<P: RulePayload> Evaluation<P> {
    /// The match, if any
    #[must_use]
    pub fn matched(&self) -> Option<&PolicyMatch<P>> {
        match self {
            Evaluation::Matched(m) => Some(m),
            Evaluation::NoMatch(_) => None,
        }
    }

    /// Whether a version matched
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Evaluation::Matched(_))
    }

    /// Matched payload, or the family's most restrictive one
    #[must_use]
    pub fn payload_or_restrictive(&self) -> P {
        match self {
            Evaluation::Matched(m) => m.payload.clone(),
            Evaluation::NoMatch(_) => P::most_restrictive(),
        }
    }
}

/// Selects the single best-matching active version of a policy family
pub struct PolicyEvaluator<P, S> {
    store: Arc<S>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: RulePayload, S: PolicyStore<P>> PolicyEvaluator<P, S> {
    /// Create an evaluator over `store`
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _payload: PhantomData,
        }
    }

    /// Evaluate `query`
    ///
    /// The lowest priority wins; equal priorities fall back to the policy
    /// code, ascending.
    pub fn evaluate(&self, query: &PolicyQuery) -> Evaluation<P> {
        let Ok(feature) = FeatureCode::parse(query.feature_code.trim()) else {
            return Self::no_match(query, NoMatchReason::InvalidFeature);
        };
        let action = match query.action_code.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<ActionCode>() {
                Ok(action) => Some(action),
                Err(_) => return Self::no_match(query, NoMatchReason::InvalidAction),
            },
        };

        let candidates = match self.store.find_current_active_versions() {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(
                    family = P::FAMILY,
                    error = %err,
                    "policy store unavailable, failing closed"
                );
                return Evaluation::NoMatch(NoMatchReason::StoreUnavailable);
            }
        };

        let best = candidates
            .into_iter()
            .filter(|c| Self::accepts(c, &feature, action, query))
            .min_by(|a, b| {
                a.version
                    .criteria()
                    .priority
                    .cmp(&b.version.criteria().priority)
                    .then_with(|| a.code.cmp(&b.code))
            });

        match best {
            Some(active) => {
                let criteria = active.version.criteria();
                tracing::debug!(
                    family = P::FAMILY,
                    feature = %feature,
                    code = %active.code,
                    version = active.version.version(),
                    priority = criteria.priority,
                    "policy matched"
                );
                Evaluation::Matched(PolicyMatch {
                    root_id: active.root_id,
                    priority: criteria.priority,
                    version: active.version.version(),
                    payload: active.version.payload().clone(),
                    policy_code: active.code,
                })
            }
            None => Self::no_match(query, NoMatchReason::NoCandidate),
        }
    }

    /// Evaluate for whatever caller `provider` resolves
    pub fn evaluate_with(
        &self,
        provider: &dyn ContextProvider,
        classification: Option<&str>,
        at: Timestamp,
    ) -> Evaluation<P> {
        match provider.resolve() {
            Some(context) => self.evaluate(&PolicyQuery::from_context(&context, classification, at)),
            None => {
                tracing::debug!(family = P::FAMILY, "no caller context, failing closed");
                Evaluation::NoMatch(NoMatchReason::MissingContext)
            }
        }
    }

    fn accepts(
        candidate: &ActiveVersion<P>,
        feature: &FeatureCode,
        action: Option<ActionCode>,
        query: &PolicyQuery,
    ) -> bool {
        let version = &candidate.version;
        let criteria = version.criteria();
        version.is_current()
            && version.is_effective_at(query.timestamp)
            && criteria.feature_code == *feature
            && criteria.matches_action(action)
            && criteria.matches_permission_group(query.permission_group_code.as_deref())
            && criteria.matches_org_groups(&query.organization_group_codes)
            && version.applies_to(query.classification.as_deref())
    }

    fn no_match(query: &PolicyQuery, reason: NoMatchReason) -> Evaluation<P> {
        tracing::debug!(
            family = P::FAMILY,
            feature = %query.feature_code,
            %reason,
            "no policy matched"
        );
        Evaluation::NoMatch(reason)
    }
}
