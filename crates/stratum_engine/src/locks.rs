//! Per-root write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stratum_core::RootId;
use stratum_policy::{PolicyError, PolicyResult};

/// One mutex per root; writers to different roots never contend
#[derive(Debug, Default)]
pub struct RootLocks {
    locks: Mutex<HashMap<RootId, Arc<Mutex<()>>>>,
}

impl RootLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `id`, created on first use
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lock table is poisoned
    pub fn lock_for(&self, id: RootId) -> PolicyResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| PolicyError::Storage("root lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    /// Number of roots that have been locked at least once
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lock table is poisoned
    pub fn tracked_roots(&self) -> PolicyResult<usize> {
        self.locks
            .lock()
            .map(|l| l.len())
            .map_err(|_| PolicyError::Storage("root lock table poisoned".to_string()))
    }
}
