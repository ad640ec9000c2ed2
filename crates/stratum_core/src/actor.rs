//! Actors and caller context.
//!
//! The engine never looks up "the current user" on its own; the caller
//! resolves a [`CallerContext`] and passes it into every evaluation.

use serde::{Deserialize, Serialize};

/// Identity recorded on every version change and audit event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Login name
    pub username: String,
    /// Display name
    pub display_name: String,
}

impl Actor {
    /// Create a new actor
    #[must_use]
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    /// Actor used for seed data and automated jobs
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", "System")
    }
}

/// Resolved identity of the caller issuing a query
///
/// Codes are kept as the raw strings the identity layer produced; the
/// evaluator parses them and fails closed on anything it does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Who is asking
    pub actor: Actor,
    /// Feature being accessed
    pub feature_code: String,
    /// Action being performed, if known
    pub action_code: Option<String>,
    /// Permission group the caller belongs to
    pub permission_group_code: Option<String>,
    /// Organization groups the caller belongs to
    #[serde(default)]
    pub organization_group_codes: Vec<String>,
}

impl CallerContext {
    /// Create a context for a feature with no action or group membership
    #[must_use]
    pub fn new(actor: Actor, feature_code: impl Into<String>) -> Self {
        Self {
            actor,
            feature_code: feature_code.into(),
            action_code: None,
            permission_group_code: None,
            organization_group_codes: Vec::new(),
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
}

/// Resolves the caller of the current request
pub trait ContextProvider: Send + Sync {
    /// Resolve the caller, or `None` when no identity is available
    fn resolve(&self) -> Option<CallerContext>;
}

/// Provider that always returns the same context
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: Option<CallerContext>,
}

impl StaticContextProvider {
    /// Provider resolving to `context`
    #[must_use]
    pub fn new(context: CallerContext) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// Provider that never resolves an identity
    #[must_use]
    pub fn anonymous() -> Self {
        Self { context: None }
    }
}

impl ContextProvider for StaticContextProvider {
    fn resolve(&self) -> Option<CallerContext> {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_context_builder() {
        let ctx = CallerContext::new(Actor::new("kim", "Kim Lee"), "HR_EMPLOYEE")
            .with_action("READ")
            .with_permission_group("HR_ADMIN")
            .with_org_group("SEOUL")
            .with_org_group("BUSAN");

        assert_eq!(ctx.feature_code, "HR_EMPLOYEE");
        assert_eq!(ctx.action_code.as_deref(), Some("READ"));
        assert_eq!(ctx.permission_group_code.as_deref(), Some("HR_ADMIN"));
        assert_eq!(ctx.organization_group_codes, vec!["SEOUL", "BUSAN"]);
    }

    #[test]
    fn test_static_provider() {
        let ctx = CallerContext::new(Actor::system(), "CRM_CUSTOMER");
        assert_eq!(StaticContextProvider::new(ctx.clone()).resolve(), Some(ctx));
        assert_eq!(StaticContextProvider::anonymous().resolve(), None);
    }

    #[test]
    fn test_context_deserialize_defaults_groups() {
        let json = r#"{
            "actor": {"username": "a", "display_name": "A"},
            "feature_code": "HR_EMPLOYEE",
            "action_code": null,
            "permission_group_code": null
        }"#;
        let ctx: CallerContext = serde_json::from_str(json).unwrap();
        assert!(ctx.organization_group_codes.is_empty());
    }
}
