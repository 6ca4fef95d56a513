//! # In-Memory Backend
//!
//! Rule state sits behind a `tokio::sync::RwLock`. A publication transaction
//! takes the write half for its entire lifetime and stages version changes
//! in a private copy, so readers see either the state before the publish or
//! the state after it, never a version closed without its successor.
//! Committing swaps the staged copies in; dropping discards them.
//!
//! Evaluation records sit behind a `parking_lot::Mutex`; insert-if-absent is
//! a single critical section, which is the in-memory equivalent of the
//! unique index on (tenant, idempotency key).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use crms_core::{EvaluationId, RulesetId, RulesetKey, TenantId, Timestamp, VersionId};
use crms_engine::Rule;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::error::StoreError;
use crate::records::{DraftWrite, EvaluationRecord, Ruleset, RulesetVersion};
use crate::traits::{EvaluationStore, RuleStore, RuleTransaction};

#[derive(Debug, Default)]
struct RuleState {
    rulesets: HashMap<RulesetId, Ruleset>,
    /// Draft rules per ruleset, in draft order.
    drafts: HashMap<RulesetId, Vec<Rule>>,
    /// Versions per ruleset, in revision order.
    versions: HashMap<RulesetId, Vec<RulesetVersion>>,
}

#[derive(Debug, Default)]
struct EvaluationState {
    records: HashMap<EvaluationId, EvaluationRecord>,
    by_key: HashMap<(TenantId, String), EvaluationId>,
}

/// Process-local store implementing both [`RuleStore`] and [`EvaluationStore`].
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rules: Arc<RwLock<RuleState>>,
    evaluations: Arc<Mutex<EvaluationState>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored evaluation records.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.lock().records.len()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert_ruleset(&self, ruleset: &Ruleset) -> Result<(), StoreError> {
        let mut state = self.rules.write().await;
        let taken = state
            .rulesets
            .values()
            .any(|r| r.tenant_id == ruleset.tenant_id && r.key == ruleset.key);
        if taken || state.rulesets.contains_key(&ruleset.ruleset_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "uq_rulesets_tenant_jurisdiction_tax".to_string(),
            });
        }
        state.rulesets.insert(ruleset.ruleset_id, ruleset.clone());
        Ok(())
    }

    async fn find_ruleset(
        &self,
        tenant_id: TenantId,
        key: &RulesetKey,
    ) -> Result<Option<Ruleset>, StoreError> {
        let state = self.rules.read().await;
        Ok(state
            .rulesets
            .values()
            .find(|r| r.tenant_id == tenant_id && &r.key == key)
            .cloned())
    }

    async fn get_ruleset(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Option<Ruleset>, StoreError> {
        let state = self.rules.read().await;
        Ok(state
            .rulesets
            .get(&ruleset_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn upsert_draft_rule(
        &self,
        ruleset_id: RulesetId,
        rule: &Rule,
        _updated_at: Timestamp,
    ) -> Result<DraftWrite, StoreError> {
        let mut state = self.rules.write().await;
        if !state.rulesets.contains_key(&ruleset_id) {
            return Err(StoreError::NotFound {
                entity: "ruleset",
                id: ruleset_id.to_string(),
            });
        }
        let drafts = state.drafts.entry(ruleset_id).or_default();
        match drafts.iter_mut().find(|d| d.rule_id == rule.rule_id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(DraftWrite::Updated)
            }
            None => {
                drafts.push(rule.clone());
                Ok(DraftWrite::Created)
            }
        }
    }

    async fn load_draft_rules(&self, ruleset_id: RulesetId) -> Result<Vec<Rule>, StoreError> {
        let state = self.rules.read().await;
        Ok(state.drafts.get(&ruleset_id).cloned().unwrap_or_default())
    }

    async fn find_version_at(
        &self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        let state = self.rules.read().await;
        Ok(state
            .versions
            .get(&ruleset_id)
            .into_iter()
            .flatten()
            .filter(|v| v.window.covers(at))
            .max_by_key(|v| v.revision)
            .cloned())
    }

    async fn list_versions(&self, ruleset_id: RulesetId) -> Result<Vec<RulesetVersion>, StoreError> {
        let state = self.rules.read().await;
        Ok(state.versions.get(&ruleset_id).cloned().unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn RuleTransaction>, StoreError> {
        let state = Arc::clone(&self.rules).write_owned().await;
        Ok(Box::new(MemoryTransaction {
            state,
            staged: HashMap::new(),
        }))
    }
}

/// Holds the write lock until committed or dropped.
struct MemoryTransaction {
    state: OwnedRwLockWriteGuard<RuleState>,
    staged: HashMap<RulesetId, Vec<RulesetVersion>>,
}

impl MemoryTransaction {
    fn versions(&self, ruleset_id: RulesetId) -> &[RulesetVersion] {
        self.staged
            .get(&ruleset_id)
            .or_else(|| self.state.versions.get(&ruleset_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn versions_mut(&mut self, ruleset_id: RulesetId) -> &mut Vec<RulesetVersion> {
        let committed = &self.state.versions;
        self.staged
            .entry(ruleset_id)
            .or_insert_with(|| committed.get(&ruleset_id).cloned().unwrap_or_default())
    }

    fn owner_of(&self, version_id: VersionId) -> Option<RulesetId> {
        self.staged
            .values()
            .chain(self.state.versions.values())
            .flatten()
            .find(|v| v.version_id == version_id)
            .map(|v| v.ruleset_id)
    }
}

#[async_trait]
impl RuleTransaction for MemoryTransaction {
    async fn lock_ruleset(&mut self, ruleset_id: RulesetId) -> Result<(), StoreError> {
        // The whole store is already write-locked.
        if self.state.rulesets.contains_key(&ruleset_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "ruleset",
                id: ruleset_id.to_string(),
            })
        }
    }

    async fn latest_version(
        &mut self,
        ruleset_id: RulesetId,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        Ok(self
            .versions(ruleset_id)
            .iter()
            .max_by_key(|v| v.revision)
            .cloned())
    }

    async fn find_active_or_overlapping(
        &mut self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Vec<RulesetVersion>, StoreError> {
        Ok(self
            .versions(ruleset_id)
            .iter()
            .filter(|v| v.window.extends_past(at))
            .cloned()
            .collect())
    }

    async fn close_version(
        &mut self,
        version_id: VersionId,
        effective_to: Timestamp,
    ) -> Result<(), StoreError> {
        let ruleset_id = self.owner_of(version_id).ok_or_else(|| StoreError::NotFound {
            entity: "ruleset version",
            id: version_id.to_string(),
        })?;
        if let Some(version) = self
            .versions_mut(ruleset_id)
            .iter_mut()
            .find(|v| v.version_id == version_id)
        {
            version.window.to = Some(effective_to);
        }
        Ok(())
    }

    async fn insert_version(&mut self, version: &RulesetVersion) -> Result<(), StoreError> {
        if !self.state.rulesets.contains_key(&version.ruleset_id) {
            return Err(StoreError::NotFound {
                entity: "ruleset",
                id: version.ruleset_id.to_string(),
            });
        }
        if self.owner_of(version.version_id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "ruleset_versions_pkey".to_string(),
            });
        }
        let versions = self.versions_mut(version.ruleset_id);
        if versions.iter().any(|v| v.revision == version.revision) {
            return Err(StoreError::UniqueViolation {
                constraint: "uq_ruleset_versions_revision".to_string(),
            });
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut state, staged } = *self;
        state.versions.extend(staged);
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<EvaluationRecord>, StoreError> {
        let state = self.evaluations.lock();
        Ok(state
            .by_key
            .get(&(tenant_id, key.to_string()))
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        record: EvaluationRecord,
    ) -> Result<(EvaluationRecord, bool), StoreError> {
        let mut state = self.evaluations.lock();
        if let Some(key) = &record.idempotency_key {
            let existing = state
                .by_key
                .get(&(record.tenant_id, key.clone()))
                .and_then(|id| state.records.get(id));
            if let Some(existing) = existing {
                return Ok((existing.clone(), false));
            }
        }
        if state.records.contains_key(&record.evaluation_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "evaluations_pkey".to_string(),
            });
        }
        if let Some(key) = &record.idempotency_key {
            state
                .by_key
                .insert((record.tenant_id, key.clone()), record.evaluation_id);
        }
        state.records.insert(record.evaluation_id, record.clone());
        Ok((record, true))
    }

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        evaluation_id: EvaluationId,
    ) -> Result<Option<EvaluationRecord>, StoreError> {
        let state = self.evaluations.lock();
        Ok(state
            .records
            .get(&evaluation_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }
}
