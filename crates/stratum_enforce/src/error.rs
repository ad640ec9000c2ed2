//! Error types for rule application.

use thiserror::Error;

/// Result alias for rule application
pub type EnforceResult<T> = Result<T, EnforceError>;

/// Rule application error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnforceError {
    /// Record to mask was not a JSON object
    #[error("record is not an object: found {found}")]
    InvalidRecord {
        /// JSON type actually found
        found: &'static str,
    },
    /// Audit sink rejected an event
    #[error("audit sink failed: {0}")]
    Audit(String),
}
