//! Errors raised by the policy lifecycle.

use stratum_core::{CoreError, RootId};

/// Policy result type
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Policy lifecycle error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Root, version or draft absent
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: &'static str,
        /// Key it was looked up by
        id: String,
    },

    /// Operation not legal in the current lifecycle state
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Policy code already taken
    #[error("duplicate policy code: {0}")]
    DuplicateCode(String),

    /// Query could not be interpreted
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Another writer saved the root first
    #[error("conflicting write on {root}: expected revision {expected}, found {actual}")]
    Conflict {
        /// Root being written
        root: RootId,
        /// Revision the writer loaded
        expected: u64,
        /// Revision found at save time
        actual: u64,
    },

    /// Input rejected by a configured limit or field rule
    #[error("validation failed: {0}")]
    Validation(String),

    /// Backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Core type error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PolicyError {
    /// Shorthand for a not-found error
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the operation unchanged
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = PolicyError::not_found("version", "root_x#3");
        assert_eq!(err.to_string(), "version not found: root_x#3");
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        let conflict = PolicyError::Conflict {
            root: RootId::from_bytes([1u8; 16]),
            expected: 2,
            actual: 3,
        };
        assert!(conflict.is_retryable());
        assert!(!PolicyError::IllegalState("x".to_string()).is_retryable());
        assert!(!PolicyError::DuplicateCode("x".to_string()).is_retryable());
    }

    #[test]
    fn test_core_error_transparent() {
        let err: PolicyError = CoreError::InvalidId {
            reason: "bad".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid ID: bad");
    }
}
