//! Audit events for lifted masks.

use crate::error::{EnforceError, EnforceResult};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use stratum_core::{AuditId, PolicyCode, RootId, Timestamp};

/// What happened to an audited value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// Caller's unmask capability bypassed the rule
    Unmasked,
    /// Policy whitelisted the caller
    Whitelisted,
    /// Value was masked
    Masked,
}

/// One audited access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub id: AuditId,
    /// Username of the caller
    pub actor: String,
    /// Field that was accessed
    pub field: String,
    /// Matched policy root
    pub policy_id: Option<RootId>,
    /// Matched policy code
    pub policy_code: Option<PolicyCode>,
    /// Feature being accessed
    pub feature: String,
    /// Action being performed
    pub action: Option<String>,
    /// When the access happened
    pub timestamp: Timestamp,
    /// What the caller received
    pub outcome: AuditOutcome,
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    /// Record one event
    ///
    /// # Errors
    ///
    /// Returns `Audit` if the event could not be recorded
    fn record(&self, event: &AuditEvent) -> EnforceResult<()>;
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events
    #[must_use]
    pub fn count(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget every event
    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> EnforceResult<()> {
        self.events
            .lock()
            .map_err(|_| EnforceError::Audit("audit sink lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Writes events to the `stratum::audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> EnforceResult<()> {
        tracing::info!(
            target: "stratum::audit",
            id = %event.id,
            actor = %event.actor,
            field = %event.field,
            policy_id = ?event.policy_id,
            policy_code = ?event.policy_code.as_ref().map(PolicyCode::as_str),
            feature = %event.feature,
            action = ?event.action,
            timestamp = %event.timestamp,
            outcome = ?event.outcome,
            "audit"
        );
        Ok(())
    }
}
