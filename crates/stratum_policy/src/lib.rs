//! stratum Policy Model
//!
//! A policy is a [`PolicyRoot`] holding every [`PolicyVersion`] it has
//! ever had. Versions are never overwritten once they leave draft; each
//! change appends a new generation and closes the previous one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod criteria;
pub mod error;
pub mod payload;
pub mod root;
pub mod version;

pub use criteria::MatchCriteria;
pub use error::{PolicyError, PolicyResult};
pub use payload::{MaskingPayload, RowScope, RulePayload};
pub use root::PolicyRoot;
pub use version::{ChangeAction, PolicyFields, PolicyVersion, VersionStatus};
