//! Seed files.
//!
//! A seed lists, per policy family, each policy code with the ordered
//! steps of its history. Loading replays those steps through the
//! lifecycle service, so a seeded catalogue has the same versions a live
//! one would.

use crate::config::StratumConfig;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use stratum_core::{Actor, RootId, Timestamp};
use stratum_engine::{LifecycleConfig, PolicyEvaluator, VersionLifecycleService};
use stratum_policy::{MaskingPayload, MatchCriteria, PolicyFields, RowScope, RulePayload};
use stratum_storage::{MemoryPolicyStore, StoreConfig};

/// One step of a seeded policy's history
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SeedStep<P> {
    /// Create on the first step, update afterwards
    Write {
        /// Step time
        at: Timestamp,
        /// Match criteria
        criteria: MatchCriteria,
        /// Rule payload
        payload: P,
        /// Change reason
        #[serde(default)]
        reason: Option<String>,
    },
    /// Save a draft
    Draft {
        /// Step time
        at: Timestamp,
        /// Match criteria
        criteria: MatchCriteria,
        /// Rule payload
        payload: P,
        /// Change reason
        #[serde(default)]
        reason: Option<String>,
    },
    /// Publish the pending draft
    Publish {
        /// Step time
        at: Timestamp,
    },
    /// Soft delete
    Delete {
        /// Step time
        at: Timestamp,
        /// Change reason
        #[serde(default)]
        reason: Option<String>,
    },
    /// Undo a soft delete
    Restore {
        /// Step time
        at: Timestamp,
        /// Change reason
        #[serde(default)]
        reason: Option<String>,
    },
    /// Roll back to an earlier version
    Rollback {
        /// Step time
        at: Timestamp,
        /// Target version number
        to: u32,
        /// Change reason
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Parsed seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    /// Actor recorded on seeded versions
    #[serde(default = "Actor::system")]
    pub actor: Actor,
    /// Masking policies by code
    #[serde(default)]
    pub masking: IndexMap<String, Vec<SeedStep<MaskingPayload>>>,
    /// Row-access policies by code
    #[serde(default)]
    pub row_access: IndexMap<String, Vec<SeedStep<RowScope>>>,
}

impl Seed {
    /// Read a seed file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading seed {}", path.display()))?;
        Self::from_json(&json).wrap_err_with(|| format!("parsing seed {}", path.display()))
    }

    /// Parse seed JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON does not describe a seed
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Replay the seed into fresh in-memory stores
    ///
    /// # Errors
    ///
    /// Returns error if any step is rejected by the lifecycle service
    pub fn into_catalog(self, config: &StratumConfig) -> Result<Catalog> {
        let masking = Family::new(config.store.clone(), config.lifecycle.clone());
        let row_access = Family::new(config.store.clone(), config.lifecycle.clone());

        for (code, steps) in &self.masking {
            masking
                .replay(code, steps, &self.actor)
                .wrap_err_with(|| format!("seeding masking policy {}", code))?;
        }
        for (code, steps) in &self.row_access {
            row_access
                .replay(code, steps, &self.actor)
                .wrap_err_with(|| format!("seeding row-access policy {}", code))?;
        }

        tracing::info!(
            masking = self.masking.len(),
            row_access = self.row_access.len(),
            "seed loaded"
        );
        Ok(Catalog { masking, row_access })
    }
}

/// Lifecycle service and evaluator sharing one store
pub struct Family<P: RulePayload> {
    /// Administrative writes and history reads
    pub lifecycle: VersionLifecycleService<P, MemoryPolicyStore<P>>,
    /// Runtime evaluation
    pub evaluator: PolicyEvaluator<P, MemoryPolicyStore<P>>,
}

impl<P: RulePayload> Family<P> {
    fn new(store: StoreConfig, lifecycle: LifecycleConfig) -> Self {
        let store = Arc::new(MemoryPolicyStore::with_config(store));
        Self {
            lifecycle: VersionLifecycleService::with_config(Arc::clone(&store), lifecycle),
            evaluator: PolicyEvaluator::new(store),
        }
    }

    /// Root id for `code`
    ///
    /// # Errors
    ///
    /// Returns error if no policy has that code
    pub fn root_id(&self, code: &str) -> Result<RootId> {
        Ok(self.lifecycle.get_policy_by_code(code)?.id())
    }

    fn replay(&self, code: &str, steps: &[SeedStep<P>], actor: &Actor) -> Result<()> {
        let mut root: Option<RootId> = None;
        for step in steps {
            match (step, root) {
                (SeedStep::Write { at, criteria, payload, reason }, None) => {
                    let fields = with_reason(criteria, payload, reason);
                    root = Some(self.lifecycle.create_policy(Some(code), fields, actor, *at)?.id());
                }
                (_, None) => bail!("first step of {} must be a write", code),
                (SeedStep::Write { at, criteria, payload, reason }, Some(id)) => {
                    let fields = with_reason(criteria, payload, reason);
                    self.lifecycle.create_update_version(id, fields, actor, *at)?;
                }
                (SeedStep::Draft { at, criteria, payload, reason }, Some(id)) => {
                    let fields = with_reason(criteria, payload, reason);
                    self.lifecycle.save_draft(id, fields, actor, *at)?;
                }
                (SeedStep::Publish { at }, Some(id)) => {
                    self.lifecycle.publish_draft(id, actor, *at)?;
                }
                (SeedStep::Delete { at, reason }, Some(id)) => {
                    self.lifecycle.create_delete_version(id, reason.clone(), actor, *at)?;
                }
                (SeedStep::Restore { at, reason }, Some(id)) => {
                    self.lifecycle.create_restore_version(id, reason.clone(), actor, *at)?;
                }
                (SeedStep::Rollback { at, to, reason }, Some(id)) => {
                    self.lifecycle
                        .rollback_to_version(id, *to, reason.clone(), actor, *at)?;
                }
            }
        }
        Ok(())
    }
}

fn with_reason<P: RulePayload>(criteria: &MatchCriteria, payload: &P, reason: &Option<String>) -> PolicyFields<P> {
    let fields = PolicyFields::new(criteria.clone(), payload.clone());
    match reason {
        Some(reason) => fields.with_reason(reason.clone()),
        None => fields,
    }
}

/// Both policy families, ready to query
pub struct Catalog {
    /// Masking family
    pub masking: Family<MaskingPayload>,
    /// Row-access family
    pub row_access: Family<RowScope>,
}
