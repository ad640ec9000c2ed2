//! Core error types for stratum.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A feature, action or policy code did not parse
    #[error("Invalid {kind} code: {value:?}")]
    InvalidCode {
        /// Which code family was being parsed
        kind: &'static str,
        /// The rejected input
        value: String,
    },

    /// Invalid ID format
    #[error("Invalid ID: {reason}")]
    InvalidId {
        /// Why the id was rejected
        reason: String,
    },

    /// Invalid timestamp
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Why the timestamp was rejected
        reason: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Failure detail
        reason: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation {
            field: "json".to_string(),
            reason: err.to_string(),
        }
    }
}
