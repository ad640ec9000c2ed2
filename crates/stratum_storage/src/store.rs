//! Persistence interface.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratum_core::{PolicyCode, RootId, Timestamp};
use stratum_policy::{PolicyResult, PolicyRoot, PolicyVersion, RulePayload};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of roots (0 = unlimited)
    pub max_roots: usize,
    /// Maximum versions kept per root (0 = unlimited)
    pub max_versions_per_root: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_roots: 0,
            max_versions_per_root: 0,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of roots
    pub root_count: usize,
    /// Number of successful inserts and saves
    pub write_count: u64,
    /// Number of saves rejected for a stale revision
    pub conflict_count: u64,
}

/// The live generation of one root, as seen by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVersion<P> {
    /// Owning root
    pub root_id: RootId,
    /// Owning root's code
    pub code: PolicyCode,
    /// The current version
    pub version: PolicyVersion<P>,
}

/// Persistence for one policy family
///
/// Roots are saved whole, so a reader sees either the generation before
/// a close-then-activate swap or the one after it, never a mix.
pub trait PolicyStore<P: RulePayload>: Send + Sync {
    /// Insert a new root
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCode` if the code is taken, or `Validation` if a
    /// configured limit is exceeded
    fn insert_root(&self, root: PolicyRoot<P>) -> PolicyResult<Arc<PolicyRoot<P>>>;

    /// Replace a root
    ///
    /// The root's revision must equal the stored one; the saved copy has
    /// its revision bumped.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a stale revision or `NotFound` for an
    /// unknown root
    fn save_root(&self, root: PolicyRoot<P>) -> PolicyResult<Arc<PolicyRoot<P>>>;

    /// Find a root by id
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_root(&self, id: RootId) -> PolicyResult<Option<Arc<PolicyRoot<P>>>>;

    /// Find a root by code
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_root_by_code(&self, code: &PolicyCode) -> PolicyResult<Option<Arc<PolicyRoot<P>>>>;

    /// All roots, ordered by code
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_all_roots(&self) -> PolicyResult<Vec<Arc<PolicyRoot<P>>>>;

    /// Current, active versions across all roots, ordered by priority
    /// and then by policy code
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_current_active_versions(&self) -> PolicyResult<Vec<ActiveVersion<P>>>;

    /// Exact version lookup
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_version(&self, id: RootId, number: u32) -> PolicyResult<Option<PolicyVersion<P>>> {
        Ok(self
            .find_root(id)?
            .and_then(|root| root.version(number).cloned()))
    }

    /// Version whose validity window contains `at`
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_version_as_of(&self, id: RootId, at: Timestamp) -> PolicyResult<Option<PolicyVersion<P>>> {
        Ok(self
            .find_root(id)?
            .and_then(|root| root.version_as_of(at).cloned()))
    }

    /// Highest version number of a root, 0 if it has none
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_max_version_number(&self, id: RootId) -> PolicyResult<u32> {
        Ok(self
            .find_root(id)?
            .map_or(0, |root| root.max_version_number()))
    }

    /// Pending draft of a root
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails
    fn find_draft(&self, id: RootId) -> PolicyResult<Option<PolicyVersion<P>>> {
        Ok(self.find_root(id)?.and_then(|root| root.draft().cloned()))
    }
}
