//! # Repository Traits
//!
//! The service layer depends on these traits only, never on a backend.
//! Methods are async because real backends do I/O; the in-memory backend
//! simply never yields.

use async_trait::async_trait;
use crms_core::{EvaluationId, RulesetId, RulesetKey, TenantId, Timestamp, VersionId};
use crms_engine::Rule;

use crate::error::StoreError;
use crate::records::{DraftWrite, EvaluationRecord, Ruleset, RulesetVersion};

/// Rulesets, drafts and published versions.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Insert a new ruleset.
    ///
    /// # Errors
    ///
    /// `UniqueViolation` if the tenant already has a ruleset with this key.
    async fn insert_ruleset(&self, ruleset: &Ruleset) -> Result<(), StoreError>;

    /// Look up a ruleset by its natural key.
    async fn find_ruleset(
        &self,
        tenant_id: TenantId,
        key: &RulesetKey,
    ) -> Result<Option<Ruleset>, StoreError>;

    /// Look up a ruleset by id, scoped to its tenant.
    async fn get_ruleset(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Option<Ruleset>, StoreError>;

    /// Create or replace a draft rule, keyed by `rule_id`.
    ///
    /// A replaced draft keeps its original position in draft order.
    async fn upsert_draft_rule(
        &self,
        ruleset_id: RulesetId,
        rule: &Rule,
        updated_at: Timestamp,
    ) -> Result<DraftWrite, StoreError>;

    /// All draft rules of a ruleset, in draft order.
    async fn load_draft_rules(&self, ruleset_id: RulesetId) -> Result<Vec<Rule>, StoreError>;

    /// The version whose window covers `at`, if any.
    async fn find_version_at(
        &self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Option<RulesetVersion>, StoreError>;

    /// Every version of a ruleset, by ascending revision.
    async fn list_versions(&self, ruleset_id: RulesetId) -> Result<Vec<RulesetVersion>, StoreError>;

    /// Open a write transaction for publication.
    async fn begin(&self) -> Result<Box<dyn RuleTransaction>, StoreError>;
}

/// A publication transaction.
///
/// Nothing written through it is visible to readers until [`commit`]
/// succeeds. Dropping it uncommitted rolls everything back.
///
/// [`commit`]: RuleTransaction::commit
#[async_trait]
pub trait RuleTransaction: Send {
    /// Serialize publishers of the same ruleset.
    ///
    /// # Errors
    ///
    /// `NotFound` if the ruleset does not exist.
    async fn lock_ruleset(&mut self, ruleset_id: RulesetId) -> Result<(), StoreError>;

    /// The version with the highest revision.
    async fn latest_version(
        &mut self,
        ruleset_id: RulesetId,
    ) -> Result<Option<RulesetVersion>, StoreError>;

    /// Versions whose window is open or ends after `at`.
    async fn find_active_or_overlapping(
        &mut self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Vec<RulesetVersion>, StoreError>;

    /// Set a version's exclusive end.
    async fn close_version(
        &mut self,
        version_id: VersionId,
        effective_to: Timestamp,
    ) -> Result<(), StoreError>;

    /// Insert a newly published version.
    async fn insert_version(&mut self, version: &RulesetVersion) -> Result<(), StoreError>;

    /// Make every staged write visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// The evaluation audit log.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// The record stored under (tenant, key), if any.
    async fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<EvaluationRecord>, StoreError>;

    /// Insert unless a record with the same (tenant, idempotency key) exists.
    ///
    /// Returns the stored record and whether it was this call that stored
    /// it. When another writer got there first, the returned record is
    /// theirs. Records without an idempotency key are always inserted.
    async fn insert_if_absent(
        &self,
        record: EvaluationRecord,
    ) -> Result<(EvaluationRecord, bool), StoreError>;

    /// Fetch a record by id, visible only to its own tenant.
    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        evaluation_id: EvaluationId,
    ) -> Result<Option<EvaluationRecord>, StoreError>;
}
