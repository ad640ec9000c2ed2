//! Feature, action and policy codes.
//!
//! Codes arrive as strings from callers and seed files. Parsing is strict:
//! anything that does not parse is treated as unrecognized, and the
//! evaluator turns that into a no-match.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of any code
pub const MAX_CODE_LEN: usize = 64;

/// Business feature a policy governs, e.g. `HR_EMPLOYEE`
///
/// Upper-case ASCII letters, digits and `_`, starting with a letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureCode(String);

impl FeatureCode {
    /// Parse a feature code
    ///
    /// # Errors
    ///
    /// Returns error if the code is blank or contains characters outside
    /// `[A-Z0-9_]`
    pub fn parse(s: &str) -> CoreResult<Self> {
        let valid = !s.is_empty()
            && s.len() <= MAX_CODE_LEN
            && s.starts_with(|c: char| c.is_ascii_uppercase())
            && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidCode {
                kind: "feature",
                value: s.to_string(),
            })
        }
    }

    /// Get as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FeatureCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FeatureCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeatureCode> for String {
    fn from(code: FeatureCode) -> Self {
        code.0
    }
}

/// Action a caller performs on a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCode {
    /// View data
    Read,
    /// Create a record
    Create,
    /// Modify a record
    Update,
    /// Remove a record
    Delete,
    /// Approve a workflow step
    Approve,
    /// Export data out of the system
    Export,
    /// Print data
    Print,
    /// View data with masking lifted
    Unmask,
}

impl ActionCode {
    /// All action codes
    pub const ALL: [ActionCode; 8] = [
        Self::Read,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Approve,
        Self::Export,
        Self::Print,
        Self::Unmask,
    ];

    /// Canonical string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Approve => "APPROVE",
            Self::Export => "EXPORT",
            Self::Print => "PRINT",
            Self::Unmask => "UNMASK",
        }
    }

    /// Whether holding this action also grants `other`
    ///
    /// `UNMASK` includes `READ`; every other action grants only itself.
    #[must_use]
    pub fn grants(&self, other: ActionCode) -> bool {
        *self == other || (*self == Self::Unmask && other == Self::Read)
    }

    /// Whether this action lifts masking
    #[must_use]
    pub fn grants_unmask(&self) -> bool {
        self.grants(Self::Unmask)
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CoreError::InvalidCode {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Human-facing policy code, unique across a policy family and immutable
/// once the root exists
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyCode(String);

impl PolicyCode {
    /// Parse a policy code
    ///
    /// # Errors
    ///
    /// Returns error if the code is blank, too long, or contains characters
    /// outside `[A-Za-z0-9_-]`
    pub fn parse(s: &str) -> CoreResult<Self> {
        let valid = !s.is_empty()
            && s.len() <= MAX_CODE_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidCode {
                kind: "policy",
                value: s.to_string(),
            })
        }
    }

    /// Get as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PolicyCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PolicyCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PolicyCode> for String {
    fn from(code: PolicyCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_code_parse() {
        assert_eq!(FeatureCode::parse("HR_EMPLOYEE").unwrap().as_str(), "HR_EMPLOYEE");
        assert!(FeatureCode::parse("PAYROLL2").is_ok());
    }

    #[test]
    fn test_feature_code_rejects_blank_and_lowercase() {
        for bad in ["", " ", "hr_employee", "_HR", "HR-EMPLOYEE", "1HR"] {
            assert!(FeatureCode::parse(bad).is_err(), "{:?} should not parse", bad);
        }
        assert!(FeatureCode::parse(&"A".repeat(MAX_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_feature_code_serde_validates() {
        let ok: FeatureCode = serde_json::from_str("\"CRM_CUSTOMER\"").unwrap();
        assert_eq!(ok.as_str(), "CRM_CUSTOMER");
        assert!(serde_json::from_str::<FeatureCode>("\"crm\"").is_err());
    }

    #[test]
    fn test_action_code_from_str() {
        assert_eq!("READ".parse::<ActionCode>().unwrap(), ActionCode::Read);
        assert_eq!("UNMASK".parse::<ActionCode>().unwrap(), ActionCode::Unmask);
        assert!("read".parse::<ActionCode>().is_err());
        assert!("FLY".parse::<ActionCode>().is_err());
    }

    #[test]
    fn test_action_code_serde_names() {
        let json = serde_json::to_string(&ActionCode::Unmask).unwrap();
        assert_eq!(json, "\"UNMASK\"");
    }

    #[test]
    fn test_unmask_includes_read() {
        assert!(ActionCode::Unmask.grants(ActionCode::Read));
        assert!(ActionCode::Unmask.grants_unmask());
        assert!(!ActionCode::Read.grants(ActionCode::Unmask));
        assert!(!ActionCode::Read.grants_unmask());
        assert!(!ActionCode::Export.grants(ActionCode::Read));
    }

    #[test]
    fn test_policy_code_parse() {
        assert!(PolicyCode::parse("MSK-0001").is_ok());
        assert!(PolicyCode::parse("row_scope_hr").is_ok());
        assert!(PolicyCode::parse("").is_err());
        assert!(PolicyCode::parse("has space").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_feature_code_rejects_lowercase(s in "[A-Z]{1,10}[a-z][A-Z_]{0,10}") {
            proptest::prop_assert!(FeatureCode::parse(&s).is_err());
        }

        #[test]
        fn prop_feature_code_accepts_canonical(s in "[A-Z][A-Z0-9_]{0,40}") {
            let code = FeatureCode::parse(&s).unwrap();
            proptest::prop_assert_eq!(code.as_str(), s.as_str());
        }
    }
}
