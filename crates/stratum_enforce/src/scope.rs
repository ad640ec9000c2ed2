//! Row visibility.

use crate::applier::RuleApplier;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use stratum_core::CallerContext;
use stratum_engine::{Evaluation, PolicyMatch};
use stratum_policy::RowScope;

/// A row whose visibility can be decided
pub trait ScopedRow {
    /// Username of the row's owner
    fn owner(&self) -> Option<&str>;

    /// Organization group the row belongs to
    fn organization_group(&self) -> Option<&str>;
}

/// JSON rows carry `owner` and `organization_group` string fields
impl ScopedRow for Value {
    fn owner(&self) -> Option<&str> {
        self.get("owner").and_then(Value::as_str)
    }

    fn organization_group(&self) -> Option<&str> {
        self.get("organization_group").and_then(Value::as_str)
    }
}

type RowPredicate = dyn Fn(&dyn ScopedRow) -> bool + Send + Sync;

/// A named, policy-specific row predicate
#[derive(Clone)]
pub struct CustomFilter {
    name: String,
    predicate: Arc<RowPredicate>,
}

impl CustomFilter {
    /// Wrap `predicate`
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&dyn ScopedRow) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Predicate name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFilter").field("name", &self.name).finish()
    }
}

/// Concrete row restriction for one caller
#[derive(Debug, Clone)]
pub enum RowFilter {
    /// Every row
    All,
    /// Rows in any of these organization groups (case-insensitive)
    OrgGroups(Vec<String>),
    /// Rows owned by this username
    Owner(String),
    /// Policy-specific predicate
    Custom(CustomFilter),
    /// No rows
    Nothing,
}

impl RowFilter {
    /// Whether `row` is visible
    #[must_use]
    pub fn permits(&self, row: &dyn ScopedRow) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::OrgGroups(groups) => row
                .organization_group()
                .is_some_and(|g| groups.iter().any(|allowed| allowed.eq_ignore_ascii_case(g))),
            RowFilter::Owner(owner) => row.owner() == Some(owner.as_str()),
            RowFilter::Custom(custom) => (custom.predicate)(row),
            RowFilter::Nothing => false,
        }
    }

    /// Visible rows of `rows`, in order
    pub fn filter<'a, R: ScopedRow>(&self, rows: impl IntoIterator<Item = &'a R>) -> Vec<&'a R>
    where
        R: 'a,
    {
        rows.into_iter().filter(|row| self.permits(*row)).collect()
    }
}

/// Resolves `CUSTOM` scopes into concrete filters
pub trait CustomScopeResolver: Send + Sync {
    /// Filter for `caller` under the matched custom policy, or `None` to
    /// deny everything
    fn resolve(&self, matched: &PolicyMatch<RowScope>, caller: &CallerContext) -> Option<RowFilter>;
}

/// Applies row-scope payloads
#[derive(Default)]
pub struct RowScopeApplier {
    resolver: Option<Arc<dyn CustomScopeResolver>>,
}

impl RowScopeApplier {
    /// Create without a custom resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `CUSTOM` scopes through `resolver`
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn CustomScopeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl RuleApplier<RowScope> for RowScopeApplier {
    type Directive = RowFilter;

    fn directive(&self, evaluation: &Evaluation<RowScope>, caller: Option<&CallerContext>) -> RowFilter {
        let Some(caller) = caller else {
            return RowFilter::Nothing;
        };
        let filter = match evaluation.payload_or_restrictive() {
            RowScope::All => RowFilter::All,
            RowScope::Org => RowFilter::OrgGroups(caller.organization_group_codes.clone()),
            RowScope::Own => RowFilter::Owner(caller.actor.username.clone()),
            RowScope::Custom => match (evaluation.matched(), &self.resolver) {
                (Some(matched), Some(resolver)) => {
                    resolver.resolve(matched, caller).unwrap_or(RowFilter::Nothing)
                }
                _ => {
                    tracing::warn!(
                        policy = ?evaluation.matched().map(|m| m.policy_code.as_str()),
                        "custom row scope without resolver, denying all rows"
                    );
                    RowFilter::Nothing
                }
            },
        };
        tracing::debug!(user = %caller.actor.username, ?filter, "row filter resolved");
        filter
    }
}
