//! Rule payloads.
//!
//! The versioning engine is generic over what a policy actually says.
//! Two payload families exist: value masking and row visibility.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Data carried by a matched policy version
pub trait RulePayload:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Family name used in logs and errors
    const FAMILY: &'static str;

    /// Prefix for generated policy codes
    const CODE_PREFIX: &'static str;

    /// Payload applied when nothing matches or no identity is available
    fn most_restrictive() -> Self;
}

/// Value-masking payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskingPayload {
    /// `false` whitelists the matched callers: values pass through
    pub masking_enabled: bool,
    /// Emit an audit event when masking is lifted
    pub audit_enabled: bool,
}

impl MaskingPayload {
    /// Mask, without auditing
    #[must_use]
    pub const fn masked() -> Self {
        Self {
            masking_enabled: true,
            audit_enabled: false,
        }
    }

    /// Whitelist, without auditing
    #[must_use]
    pub const fn whitelisted() -> Self {
        Self {
            masking_enabled: false,
            audit_enabled: false,
        }
    }

    /// Turn auditing on
    #[must_use]
    pub const fn audited(mut self) -> Self {
        self.audit_enabled = true;
        self
    }
}

impl RulePayload for MaskingPayload {
    const FAMILY: &'static str = "masking";
    const CODE_PREFIX: &'static str = "MSK";

    fn most_restrictive() -> Self {
        Self {
            masking_enabled: true,
            audit_enabled: true,
        }
    }
}

/// Row-visibility payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowScope {
    /// Every row
    All,
    /// Rows in the caller's organization groups
    Org,
    /// Rows owned by the caller
    Own,
    /// Policy-specific predicate resolved outside the engine
    Custom,
}

impl RulePayload for RowScope {
    const FAMILY: &'static str = "row-access";
    const CODE_PREFIX: &'static str = "ROW";

    fn most_restrictive() -> Self {
        Self::Own
    }
}
