//! In-memory policy store.

use crate::store::{ActiveVersion, PolicyStore, StoreConfig, StoreStats};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stratum_core::{PolicyCode, RootId};
use stratum_policy::{PolicyError, PolicyResult, PolicyRoot, RulePayload};

struct Tables<P> {
    roots: HashMap<RootId, Arc<PolicyRoot<P>>>,
    by_code: HashMap<PolicyCode, RootId>,
}

/// In-memory store
///
/// All tables sit behind one lock, so every read is a consistent
/// snapshot of every root.
pub struct MemoryPolicyStore<P> {
    config: StoreConfig,
    tables: RwLock<Tables<P>>,
    stats: RwLock<StoreStats>,
}

impl<P: RulePayload> MemoryPolicyStore<P> {
    /// Create a new store
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create with custom configuration
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            tables: RwLock::new(Tables {
                roots: HashMap::new(),
                by_code: HashMap::new(),
            }),
            stats: RwLock::new(StoreStats::default()),
        }
    }

    /// Get store statistics
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the stats lock is poisoned
    pub fn stats(&self) -> PolicyResult<StoreStats> {
        self.stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| poisoned("stats"))
    }

    fn read(&self) -> PolicyResult<RwLockReadGuard<'_, Tables<P>>> {
        self.tables.read().map_err(|_| poisoned("tables"))
    }

    fn write(&self) -> PolicyResult<RwLockWriteGuard<'_, Tables<P>>> {
        self.tables.write().map_err(|_| poisoned("tables"))
    }

    fn record(&self, update: impl FnOnce(&mut StoreStats)) -> PolicyResult<()> {
        let mut stats = self.stats.write().map_err(|_| poisoned("stats"))?;
        update(&mut stats);
        Ok(())
    }

    fn check_version_limit(&self, root: &PolicyRoot<P>) -> PolicyResult<()> {
        let limit = self.config.max_versions_per_root;
        let count = root.max_version_number() as usize;
        if limit > 0 && count > limit {
            return Err(PolicyError::Validation(format!(
                "{} has {} versions (limit: {})",
                root.code(),
                count,
                limit
            )));
        }
        Ok(())
    }
}

fn poisoned(what: &str) -> PolicyError {
    PolicyError::Storage(format!("{} lock poisoned", what))
}

impl<P: RulePayload> Default for MemoryPolicyStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RulePayload> PolicyStore<P> for MemoryPolicyStore<P> {
    fn insert_root(&self, mut root: PolicyRoot<P>) -> PolicyResult<Arc<PolicyRoot<P>>> {
        self.check_version_limit(&root)?;
        let mut tables = self.write()?;

        if tables.by_code.contains_key(root.code()) {
            return Err(PolicyError::DuplicateCode(root.code().to_string()));
        }
        if tables.roots.contains_key(&root.id()) {
            return Err(PolicyError::IllegalState(format!("{} already stored", root.id())));
        }
        let limit = self.config.max_roots;
        if limit > 0 && tables.roots.len() >= limit {
            return Err(PolicyError::Validation(format!(
                "store holds {} roots (limit: {})",
                tables.roots.len(),
                limit
            )));
        }

        root.bump_revision();
        let root = Arc::new(root);
        tables.by_code.insert(root.code().clone(), root.id());
        tables.roots.insert(root.id(), Arc::clone(&root));
        let count = tables.roots.len();
        drop(tables);

        self.record(|s| {
            s.root_count = count;
            s.write_count += 1;
        })?;
        tracing::debug!(root = %root.id(), code = %root.code(), "inserted root");
        Ok(root)
    }

    fn save_root(&self, mut root: PolicyRoot<P>) -> PolicyResult<Arc<PolicyRoot<P>>> {
        self.check_version_limit(&root)?;
        let mut tables = self.write()?;

        let stored = tables
            .roots
            .get(&root.id())
            .ok_or_else(|| PolicyError::not_found("root", root.id()))?;
        if stored.revision() != root.revision() {
            let err = PolicyError::Conflict {
                root: root.id(),
                expected: root.revision(),
                actual: stored.revision(),
            };
            drop(tables);
            self.record(|s| s.conflict_count += 1)?;
            tracing::warn!(error = %err, "rejected stale save");
            return Err(err);
        }
        if stored.code() != root.code() {
            return Err(PolicyError::IllegalState(format!(
                "policy code is immutable: {} -> {}",
                stored.code(),
                root.code()
            )));
        }

        root.bump_revision();
        let root = Arc::new(root);
        tables.roots.insert(root.id(), Arc::clone(&root));
        drop(tables);

        self.record(|s| s.write_count += 1)?;
        Ok(root)
    }

    fn find_root(&self, id: RootId) -> PolicyResult<Option<Arc<PolicyRoot<P>>>> {
        Ok(self.read()?.roots.get(&id).cloned())
    }

    fn find_root_by_code(&self, code: &PolicyCode) -> PolicyResult<Option<Arc<PolicyRoot<P>>>> {
        let tables = self.read()?;
        Ok(tables
            .by_code
            .get(code)
            .and_then(|id| tables.roots.get(id))
            .cloned())
    }

    fn find_all_roots(&self) -> PolicyResult<Vec<Arc<PolicyRoot<P>>>> {
        let mut roots: Vec<_> = self.read()?.roots.values().cloned().collect();
        roots.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(roots)
    }

    fn find_current_active_versions(&self) -> PolicyResult<Vec<ActiveVersion<P>>> {
        let tables = self.read()?;
        let mut active: Vec<ActiveVersion<P>> = tables
            .roots
            .values()
            .filter(|root| root.is_active())
            .filter_map(|root| {
                root.current().map(|version| ActiveVersion {
                    root_id: root.id(),
                    code: root.code().clone(),
                    version: version.clone(),
                })
            })
            .collect();
        drop(tables);

        active.sort_by(|a, b| {
            a.version
                .criteria()
                .priority
                .cmp(&b.version.criteria().priority)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(active)
    }
}
