//! stratum Enforce
//!
//! Turns an [`Evaluation`](stratum_engine::Evaluation) into its effect:
//! a masked value, a row filter, and an audit trail for every lifted mask.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod applier;
pub mod audit;
pub mod error;
pub mod redact;
pub mod scope;

pub use applier::RuleApplier;
pub use audit::{AuditEvent, AuditOutcome, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::{EnforceError, EnforceResult};
pub use redact::{MaskDecision, MaskRule, MaskingApplier, MaskingConfig, SensitiveField};
pub use scope::{CustomFilter, CustomScopeResolver, RowFilter, RowScopeApplier, ScopedRow};
