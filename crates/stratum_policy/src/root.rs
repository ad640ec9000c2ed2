//! Policy roots.
//!
//! A root is the stable identity of a policy. It owns every version the
//! policy has had, keyed by version number, and points at the current,
//! previous and pending (draft) generations.
//!
//! Version numbers are gapless: a draft always sits at the number the
//! next published generation would take, and is dropped from the arena
//! whenever another generation is activated in its place.
//!
//! "Never reused" applies to numbers that reached history. A draft's
//! number is only reserved while the draft exists: discarding it frees
//! the number for the next draft or update, so the history of published
//! and historical generations stays gapless. Rollbacks always take a
//! fresh number above every historical one.

use crate::error::{PolicyError, PolicyResult};
use crate::payload::RulePayload;
use crate::version::PolicyVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stratum_core::{Actor, PolicyCode, RootId, Timestamp};

/// Stable identity and version container for one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRoot<P> {
    id: RootId,
    code: PolicyCode,
    current_version: Option<u32>,
    previous_version: Option<u32>,
    next_version: Option<u32>,
    versions: BTreeMap<u32, PolicyVersion<P>>,
    created_at: Timestamp,
    updated_at: Timestamp,
    revision: u64,
}

impl<P: RulePayload> PolicyRoot<P> {
    /// Allocate an empty root with a generated code
    ///
    /// # Errors
    ///
    /// Returns error if `prefix` makes the generated code invalid
    pub fn create(prefix: &str, now: Timestamp) -> PolicyResult<Self> {
        let id = RootId::new();
        let suffix = id.as_uuid().simple().to_string()[..8].to_uppercase();
        let code = PolicyCode::parse(&format!("{}-{}", prefix, suffix))?;
        Ok(Self::with_id(id, code, now))
    }

    /// Allocate an empty root with a caller-supplied code
    ///
    /// Uniqueness of `code` is enforced by the store on insert.
    #[must_use]
    pub fn create_with_code(code: PolicyCode, now: Timestamp) -> Self {
        Self::with_id(RootId::new(), code, now)
    }

    fn with_id(id: RootId, code: PolicyCode, now: Timestamp) -> Self {
        Self {
            id,
            code,
            current_version: None,
            previous_version: None,
            next_version: None,
            versions: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Make `version` the live generation
    ///
    /// Shifts current to previous and consumes any pending draft. The
    /// caller closes the outgoing current first.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if `version` is not an open published
    /// version of this root, or its number is already taken
    pub fn activate_new_version(&mut self, version: PolicyVersion<P>, now: Timestamp) -> PolicyResult<()> {
        if version.root_id() != self.id {
            return Err(PolicyError::IllegalState(format!(
                "version belongs to {}, not {}",
                version.root_id(),
                self.id
            )));
        }
        if !version.is_current() {
            return Err(PolicyError::IllegalState(
                "only an open published version may become current".to_string(),
            ));
        }
        let number = version.version();
        if number != self.next_version_number() {
            return Err(PolicyError::IllegalState(format!(
                "version {} is out of sequence, expected {}",
                number,
                self.next_version_number()
            )));
        }
        if let Some(current) = self.current() {
            if current.is_current() {
                return Err(PolicyError::IllegalState(
                    "current version must be closed before activation".to_string(),
                ));
            }
        }

        if let Some(draft) = self.next_version.take() {
            self.versions.remove(&draft);
        }
        self.previous_version = self.current_version;
        self.versions.insert(number, version);
        self.current_version = Some(number);
        self.updated_at = now;
        Ok(())
    }

    /// Install a pending draft
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if `draft` is not a draft of this root at
    /// the next version number, or a draft already exists
    pub fn set_draft_version(&mut self, draft: PolicyVersion<P>) -> PolicyResult<()> {
        if !draft.is_draft() {
            return Err(PolicyError::IllegalState(
                "pending version is not a draft".to_string(),
            ));
        }
        if draft.root_id() != self.id {
            return Err(PolicyError::IllegalState(format!(
                "draft belongs to {}, not {}",
                draft.root_id(),
                self.id
            )));
        }
        if self.next_version.is_some() {
            return Err(PolicyError::IllegalState(
                "a draft already exists".to_string(),
            ));
        }
        let number = draft.version();
        if number != self.next_version_number() {
            return Err(PolicyError::IllegalState(format!(
                "draft version {} is out of sequence, expected {}",
                number,
                self.next_version_number()
            )));
        }
        self.versions.insert(number, draft);
        self.next_version = Some(number);
        Ok(())
    }

    /// Publish the pending draft and make it current
    ///
    /// Returns the published version number.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if there is no draft; nothing is modified
    pub fn publish_draft(&mut self, actor: &Actor, now: Timestamp) -> PolicyResult<u32> {
        let number = self
            .next_version
            .ok_or_else(|| PolicyError::IllegalState("no draft to publish".to_string()))?;
        match self.versions.get(&number) {
            Some(draft) if draft.is_draft() => {}
            _ => {
                return Err(PolicyError::IllegalState(
                    "pending version is not a draft".to_string(),
                ));
            }
        }

        self.next_version = None;
        let Some(mut draft) = self.versions.remove(&number) else {
            return Err(PolicyError::not_found("draft", number));
        };
        draft.publish(actor, now)?;
        self.close_current(now);
        self.activate_new_version(draft, now)?;
        Ok(number)
    }

    /// Drop the pending draft, returning it
    pub fn discard_draft(&mut self) -> Option<PolicyVersion<P>> {
        let number = self.next_version.take()?;
        self.versions.remove(&number)
    }

    /// Close the live generation at `now`, if any
    pub fn close_current(&mut self, now: Timestamp) {
        if let Some(number) = self.current_version {
            if let Some(current) = self.versions.get_mut(&number) {
                current.close(now);
            }
        }
    }

    /// Mutable access to the pending draft
    pub fn draft_mut(&mut self) -> Option<&mut PolicyVersion<P>> {
        let number = self.next_version?;
        self.versions.get_mut(&number)
    }

    /// Record a successful save
    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Root id
    #[must_use]
    pub fn id(&self) -> RootId {
        self.id
    }

    /// Policy code
    #[must_use]
    pub fn code(&self) -> &PolicyCode {
        &self.code
    }

    /// Creation time
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last activation time
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Number of saves so far
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The live generation
    #[must_use]
    pub fn current(&self) -> Option<&PolicyVersion<P>> {
        self.current_version.and_then(|n| self.versions.get(&n))
    }

    /// The generation the current one replaced
    #[must_use]
    pub fn previous(&self) -> Option<&PolicyVersion<P>> {
        self.previous_version.and_then(|n| self.versions.get(&n))
    }

    /// The pending draft
    #[must_use]
    pub fn draft(&self) -> Option<&PolicyVersion<P>> {
        self.next_version.and_then(|n| self.versions.get(&n))
    }

    /// Exact version lookup, drafts included
    #[must_use]
    pub fn version(&self, number: u32) -> Option<&PolicyVersion<P>> {
        self.versions.get(&number)
    }

    /// Non-draft versions, most recent first
    pub fn history(&self) -> impl Iterator<Item = &PolicyVersion<P>> {
        self.versions.values().rev().filter(|v| !v.is_draft())
    }

    /// The version that was the record of truth at `at`
    #[must_use]
    pub fn version_as_of(&self, at: Timestamp) -> Option<&PolicyVersion<P>> {
        self.history().find(|v| v.was_valid_at(at))
    }

    /// Highest version number stored, drafts included
    #[must_use]
    pub fn max_version_number(&self) -> u32 {
        self.versions.keys().next_back().copied().unwrap_or(0)
    }

    /// Number the next generation (draft or published) will take
    #[must_use]
    pub fn next_version_number(&self) -> u32 {
        self.history().next().map_or(0, PolicyVersion::version) + 1
    }

    /// Current exists and is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current()
            .is_some_and(|c| c.is_current() && c.criteria().active)
    }

    /// A previous generation exists
    #[must_use]
    pub fn can_rollback(&self) -> bool {
        self.previous_version.is_some()
    }

    /// A draft is pending
    #[must_use]
    pub fn has_draft(&self) -> bool {
        self.draft().is_some_and(PolicyVersion::is_draft)
    }

    /// Version number of the live generation
    #[must_use]
    pub fn current_version_number(&self) -> Option<u32> {
        self.current_version
    }

    /// Check structural invariants
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` describing the first violation found
    pub fn verify(&self) -> PolicyResult<()> {
        let drafts = self.versions.values().filter(|v| v.is_draft()).count();
        if drafts > 1 {
            return Err(PolicyError::IllegalState(format!("{} drafts", drafts)));
        }
        if drafts == 1 && !self.has_draft() {
            return Err(PolicyError::IllegalState("orphaned draft".to_string()));
        }
        for (expected, number) in (1u32..).zip(self.versions.keys()) {
            if *number != expected {
                return Err(PolicyError::IllegalState(format!(
                    "version {} follows gap, expected {}",
                    number, expected
                )));
            }
        }
        let open = self.history().filter(|v| v.valid_to().is_none()).count();
        let expected_open = usize::from(self.current_version.is_some());
        if open != expected_open {
            return Err(PolicyError::IllegalState(format!("{} open versions", open)));
        }
        if self.current().is_some_and(|c| !c.is_current()) {
            return Err(PolicyError::IllegalState("current version is closed".to_string()));
        }
        Ok(())
    }
}
