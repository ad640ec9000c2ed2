//! Value masking.
//!
//! A caller able to unmask sees the raw value. A whitelisting policy lets
//! the raw value through. A matched masking policy applies the field's
//! [`MaskRule`]. Without a match or a caller the value is fully masked,
//! whatever rule the field carries. Matched policies with auditing on
//! record one event per value.

use crate::applier::RuleApplier;
use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::error::{EnforceError, EnforceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use stratum_core::{ActionCode, AuditId, CallerContext, Timestamp};
use stratum_engine::{Evaluation, PolicyEvaluator, PolicyMatch, PolicyQuery};
use stratum_policy::MaskingPayload;
use stratum_storage::PolicyStore;

/// How a sensitive value is masked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaskRule {
    /// Pass the value through
    None,
    /// Replace with a type-aware placeholder
    Full,
    /// Keep the edges, hide the middle
    Partial,
    /// Truncated SHA-256 digest
    Hash,
    /// Same digest as `Hash`; values are not reversible
    Tokenize,
}

/// Masking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Replacement text for fully masked strings
    pub placeholder: String,
    /// Characters kept at each end by `Partial`
    pub partial_keep: usize,
    /// Shorter strings are fully masked by `Partial`
    pub partial_min_len: usize,
    /// Hex characters kept from the digest
    pub hash_hex_len: usize,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            placeholder: "***".to_string(),
            partial_keep: 2,
            partial_min_len: 5,
            hash_hex_len: 8,
        }
    }
}

/// A field that carries sensitive data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensitiveField {
    /// Field name in the record
    pub name: String,
    /// Data classification used to select policies
    #[serde(default)]
    pub classification: Option<String>,
    /// Rule applied when the value is masked
    pub rule: MaskRule,
}

impl SensitiveField {
    /// Describe a field
    pub fn new(name: impl Into<String>, rule: MaskRule) -> Self {
        Self {
            name: name.into(),
            classification: None,
            rule,
        }
    }

    /// Set the classification
    #[must_use]
    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }
}

/// What to do with one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDecision {
    /// Unmask capability: raw value
    Reveal {
        /// Emit an `Unmasked` audit event
        audit: bool,
    },
    /// Whitelisted by policy: raw value
    Whitelist {
        /// Emit a `Whitelisted` audit event
        audit: bool,
    },
    /// Matched masking policy: apply the field's rule
    Mask {
        /// Emit a `Masked` audit event
        audit: bool,
    },
    /// No match or no caller: full mask
    Deny,
}

/// Applies masking payloads to values
pub struct MaskingApplier {
    config: MaskingConfig,
    sink: Arc<dyn AuditSink>,
}

impl MaskingApplier {
    /// Create with default configuration
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_config(sink, MaskingConfig::default())
    }

    /// Create with custom configuration
    #[must_use]
    pub fn with_config(sink: Arc<dyn AuditSink>, config: MaskingConfig) -> Self {
        Self { config, sink }
    }

    /// Get configuration
    #[must_use]
    pub fn config(&self) -> &MaskingConfig {
        &self.config
    }

    /// Mask or reveal `value` of `field` for `caller`
    ///
    /// A raw value is only returned once its audit event, if any, is
    /// recorded. An audit failure on a reveal fully masks the value.
    pub fn apply(
        &self,
        evaluation: &Evaluation<MaskingPayload>,
        caller: Option<&CallerContext>,
        field: &SensitiveField,
        value: &Value,
        at: Timestamp,
    ) -> Value {
        match self.directive(evaluation, caller) {
            MaskDecision::Reveal { audit } => {
                self.reveal(evaluation, caller, field, value, at, audit, AuditOutcome::Unmasked)
            }
            MaskDecision::Whitelist { audit } => {
                tracing::debug!(
                    field = %field.name,
                    policy = ?evaluation.matched().map(|m| m.policy_code.as_str()),
                    "whitelisted value passed through"
                );
                self.reveal(evaluation, caller, field, value, at, audit, AuditOutcome::Whitelisted)
            }
            MaskDecision::Mask { audit } => {
                if audit {
                    if let Err(err) = self.audit(evaluation, caller, field, at, AuditOutcome::Masked) {
                        tracing::warn!(field = %field.name, error = %err, "mask audit failed");
                    }
                }
                self.mask_value(field.rule, value)
            }
            MaskDecision::Deny => {
                tracing::debug!(
                    field = %field.name,
                    matched = evaluation.is_match(),
                    caller = caller.is_some(),
                    "no applicable policy or caller, fully masking"
                );
                self.mask_value(MaskRule::Full, value)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn reveal(
        &self,
        evaluation: &Evaluation<MaskingPayload>,
        caller: Option<&CallerContext>,
        field: &SensitiveField,
        value: &Value,
        at: Timestamp,
        audit: bool,
        outcome: AuditOutcome,
    ) -> Value {
        if !audit {
            return value.clone();
        }
        match self.audit(evaluation, caller, field, at, outcome) {
            Ok(()) => value.clone(),
            Err(err) => {
                tracing::warn!(
                    field = %field.name,
                    error = %err,
                    "reveal audit failed, masking value"
                );
                self.mask_value(MaskRule::Full, value)
            }
        }
    }

    fn audit(
        &self,
        evaluation: &Evaluation<MaskingPayload>,
        caller: Option<&CallerContext>,
        field: &SensitiveField,
        at: Timestamp,
        outcome: AuditOutcome,
    ) -> EnforceResult<()> {
        let (Some(caller), Some(matched)) = (caller, evaluation.matched()) else {
            return Err(EnforceError::Audit(format!(
                "no caller or matched policy for {}",
                field.name
            )));
        };
        self.sink.record(&Self::event(caller, matched, field, at, outcome))
    }

    /// Mask every described field of a JSON object in place
    ///
    /// Each field is evaluated with its own classification. Returns the
    /// number of fields that were present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if `record` is not an object
    pub fn apply_record<S: PolicyStore<MaskingPayload>>(
        &self,
        evaluator: &PolicyEvaluator<MaskingPayload, S>,
        caller: Option<&CallerContext>,
        fields: &[SensitiveField],
        record: &mut Value,
        at: Timestamp,
    ) -> EnforceResult<usize> {
        let found = json_type(record);
        let Some(object) = record.as_object_mut() else {
            return Err(EnforceError::InvalidRecord { found });
        };

        let mut touched = 0;
        for field in fields {
            let Some(value) = object.get_mut(&field.name) else {
                continue;
            };
            let evaluation = match caller {
                Some(caller) => evaluator.evaluate(&PolicyQuery::from_context(
                    caller,
                    field.classification.as_deref(),
                    at,
                )),
                None => Evaluation::NoMatch(stratum_engine::NoMatchReason::MissingContext),
            };
            *value = self.apply(&evaluation, caller, field, &*value, at);
            touched += 1;
        }
        Ok(touched)
    }

    /// Apply `rule` to a JSON value
    #[must_use]
    pub fn mask_value(&self, rule: MaskRule, value: &Value) -> Value {
        match (rule, value) {
            (MaskRule::None, _) => value.clone(),
            (_, Value::Null) => Value::Null,
            (MaskRule::Full, _) => self.full(value),
            (MaskRule::Partial, Value::String(s)) => Value::String(self.partial(s)),
            (MaskRule::Partial, _) => self.full(value),
            (MaskRule::Hash | MaskRule::Tokenize, Value::String(s)) => Value::String(self.digest(s)),
            (MaskRule::Hash | MaskRule::Tokenize, other) => Value::String(self.digest(&other.to_string())),
        }
    }

    /// Apply `rule` to a string
    #[must_use]
    pub fn mask_str(&self, rule: MaskRule, value: &str) -> String {
        match rule {
            MaskRule::None => value.to_string(),
            MaskRule::Full => self.config.placeholder.clone(),
            MaskRule::Partial => self.partial(value),
            MaskRule::Hash | MaskRule::Tokenize => self.digest(value),
        }
    }

    fn full(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Bool(_) => Value::Bool(false),
            Value::Number(_) => Value::from(0),
            Value::String(_) | Value::Array(_) | Value::Object(_) => {
                Value::String(self.config.placeholder.clone())
            }
        }
    }

    fn partial(&self, value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        let keep = self.config.partial_keep;
        if chars.len() < self.config.partial_min_len || chars.len() <= keep * 2 {
            return self.config.placeholder.clone();
        }
        let head: String = chars[..keep].iter().collect();
        let tail: String = chars[chars.len() - keep..].iter().collect();
        format!("{}{}{}", head, self.config.placeholder, tail)
    }

    fn digest(&self, value: &str) -> String {
        let mut encoded = hex::encode(Sha256::digest(value.as_bytes()));
        encoded.truncate(self.config.hash_hex_len);
        encoded
    }

    fn event(
        caller: &CallerContext,
        matched: &PolicyMatch<MaskingPayload>,
        field: &SensitiveField,
        at: Timestamp,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent {
            id: AuditId::new(),
            actor: caller.actor.username.clone(),
            field: field.name.clone(),
            policy_id: Some(matched.root_id),
            policy_code: Some(matched.policy_code.clone()),
            feature: caller.feature_code.clone(),
            action: caller.action_code.clone(),
            timestamp: at,
            outcome,
        }
    }
}

impl RuleApplier<MaskingPayload> for MaskingApplier {
    type Directive = MaskDecision;

    fn directive(
        &self,
        evaluation: &Evaluation<MaskingPayload>,
        caller: Option<&CallerContext>,
    ) -> MaskDecision {
        let (Some(matched), Some(caller)) = (evaluation.matched(), caller) else {
            return MaskDecision::Deny;
        };
        let audit = matched.payload.audit_enabled;
        let unmask = caller
            .action_code
            .as_deref()
            .and_then(|a| a.trim().parse::<ActionCode>().ok())
            .is_some_and(|a| a.grants_unmask());

        if unmask {
            MaskDecision::Reveal { audit }
        } else if !matched.payload.masking_enabled {
            MaskDecision::Whitelist { audit }
        } else {
            MaskDecision::Mask { audit }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
