//! Subcommand implementations.
//!
//! Each command returns the JSON document the binary prints.

use crate::seed::{Catalog, Family};
use clap::ValueEnum;
use color_eyre::Result;
use serde_json::{Value, json};
use std::sync::Arc;
use stratum_core::{Actor, CallerContext, Timestamp};
use stratum_enforce::{AuditSink, MaskRule, MaskingApplier, MaskingConfig, MemoryAuditSink, SensitiveField, TracingAuditSink};
use stratum_engine::PolicyQuery;
use stratum_policy::RulePayload;

/// Policy family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyKind {
    /// Value masking
    Masking,
    /// Row visibility
    RowAccess,
}

/// Evaluate `query` against one family
///
/// # Errors
///
/// Returns error if the result cannot be serialized
pub fn evaluate(catalog: &Catalog, family: FamilyKind, query: &PolicyQuery) -> Result<Value> {
    let out = match family {
        FamilyKind::Masking => serde_json::to_value(catalog.masking.evaluator.evaluate(query))?,
        FamilyKind::RowAccess => serde_json::to_value(catalog.row_access.evaluator.evaluate(query))?,
    };
    Ok(out)
}

/// Value masking request
#[derive(Debug, Clone)]
pub struct MaskRequest {
    /// Caller
    pub caller: CallerContext,
    /// Field being read
    pub field: SensitiveField,
    /// Raw value
    pub value: Value,
    /// Request time
    pub at: Timestamp,
}

/// Mask one value for one caller
///
/// Audit events go to the `stratum::audit` log target and are echoed in
/// the output.
///
/// # Errors
///
/// Returns error if the result cannot be serialized
pub fn mask(catalog: &Catalog, config: &MaskingConfig, request: &MaskRequest) -> Result<Value> {
    let memory = Arc::new(MemoryAuditSink::new());
    let sink = Arc::new(Tee {
        memory: Arc::clone(&memory),
    });
    let applier = MaskingApplier::with_config(sink, config.clone());

    let query = PolicyQuery::from_context(&request.caller, request.field.classification.as_deref(), request.at);
    let evaluation = catalog.masking.evaluator.evaluate(&query);
    let masked = applier.apply(&evaluation, Some(&request.caller), &request.field, &request.value, request.at);

    Ok(json!({
        "field": request.field.name,
        "value": masked,
        "evaluation": serde_json::to_value(&evaluation)?,
        "audit": serde_json::to_value(memory.events())?,
    }))
}

struct Tee {
    memory: Arc<MemoryAuditSink>,
}

impl AuditSink for Tee {
    fn record(&self, event: &stratum_enforce::AuditEvent) -> stratum_enforce::EnforceResult<()> {
        TracingAuditSink.record(event)?;
        self.memory.record(event)
    }
}

/// Version history of `code`, most recent first
///
/// # Errors
///
/// Returns error if no policy has that code
pub fn history(catalog: &Catalog, family: FamilyKind, code: &str) -> Result<Value> {
    match family {
        FamilyKind::Masking => history_of(&catalog.masking, code),
        FamilyKind::RowAccess => history_of(&catalog.row_access, code),
    }
}

fn history_of<P: RulePayload>(family: &Family<P>, code: &str) -> Result<Value> {
    let id = family.root_id(code)?;
    let root = family.lifecycle.get_policy(id)?;
    Ok(json!({
        "code": root.code(),
        "current": root.current_version_number(),
        "draft": root.draft().map(|d| d.version()),
        "versions": serde_json::to_value(family.lifecycle.get_version_history(id)?)?,
    }))
}

/// Version of `code` that was the record of truth at `at`
///
/// # Errors
///
/// Returns error if no policy has that code or no version covers `at`
pub fn as_of(catalog: &Catalog, family: FamilyKind, code: &str, at: Timestamp) -> Result<Value> {
    match family {
        FamilyKind::Masking => as_of_in(&catalog.masking, code, at),
        FamilyKind::RowAccess => as_of_in(&catalog.row_access, code, at),
    }
}

fn as_of_in<P: RulePayload>(family: &Family<P>, code: &str, at: Timestamp) -> Result<Value> {
    let id = family.root_id(code)?;
    Ok(serde_json::to_value(family.lifecycle.get_version_as_of(id, at)?)?)
}

/// Caller for command-line requests
#[must_use]
pub fn caller(
    user: &str,
    feature: &str,
    action: Option<&str>,
    permission_group: Option<&str>,
    org_groups: &[String],
) -> CallerContext {
    let mut context = CallerContext::new(Actor::new(user, user), feature);
    if let Some(action) = action {
        context = context.with_action(action);
    }
    if let Some(group) = permission_group {
        context = context.with_permission_group(group);
    }
    for group in org_groups {
        context = context.with_org_group(group.clone());
    }
    context
}

/// Parse a mask rule name, case-insensitively
///
/// # Errors
///
/// Returns an error message naming the accepted rules
pub fn parse_rule(s: &str) -> Result<MaskRule, String> {
    serde_json::from_value(Value::String(s.to_ascii_uppercase()))
        .map_err(|_| format!("unknown mask rule {:?}, expected NONE, FULL, PARTIAL, HASH or TOKENIZE", s))
}

/// Parse an RFC 3339 timestamp
///
/// # Errors
///
/// Returns the parse failure as a message
pub fn parse_timestamp(s: &str) -> Result<Timestamp, String> {
    Timestamp::parse(s).map_err(|e| e.to_string())
}
