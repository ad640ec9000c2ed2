//! The rule applier contract.

use stratum_core::CallerContext;
use stratum_engine::Evaluation;
use stratum_policy::RulePayload;

/// Translates an evaluation into a payload-specific directive
///
/// A `NoMatch` evaluation or a missing caller must yield the most
/// restrictive directive the payload family has.
pub trait RuleApplier<P: RulePayload> {
    /// What the caller enforces: a mask decision, a row filter
    type Directive;

    /// Directive for `caller` under `evaluation`
    fn directive(&self, evaluation: &Evaluation<P>, caller: Option<&CallerContext>) -> Self::Directive;
}
