//! A publication that fails part-way leaves no trace.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{ca_rule, request, ts};
use crms_core::{FixedClock, RulesetId, RulesetKey, TenantId, Timestamp, VersionId};
use crms_engine::Rule;
use crms_service::{
    CreateRulesetRequest, PublishRequest, RulesService, ServiceConfig, ServiceError,
};
use crms_store::{
    DraftWrite, MemoryStore, RuleStore, RuleTransaction, Ruleset, RulesetVersion, StoreError,
};
use parking_lot::Mutex;

/// Delegates to a [`MemoryStore`] but can be told to fail version inserts.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_inserts: Arc<Mutex<bool>>,
}

impl FlakyStore {
    fn fail_next_publish(&self, fail: bool) {
        *self.fail_inserts.lock() = fail;
    }
}

#[async_trait]
impl RuleStore for FlakyStore {
    async fn insert_ruleset(&self, ruleset: &Ruleset) -> Result<(), StoreError> {
        self.inner.insert_ruleset(ruleset).await
    }

    async fn find_ruleset(
        &self,
        tenant_id: TenantId,
        key: &RulesetKey,
    ) -> Result<Option<Ruleset>, StoreError> {
        self.inner.find_ruleset(tenant_id, key).await
    }

    async fn get_ruleset(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Option<Ruleset>, StoreError> {
        self.inner.get_ruleset(tenant_id, ruleset_id).await
    }

    async fn upsert_draft_rule(
        &self,
        ruleset_id: RulesetId,
        rule: &Rule,
        updated_at: Timestamp,
    ) -> Result<DraftWrite, StoreError> {
        self.inner.upsert_draft_rule(ruleset_id, rule, updated_at).await
    }

    async fn load_draft_rules(&self, ruleset_id: RulesetId) -> Result<Vec<Rule>, StoreError> {
        self.inner.load_draft_rules(ruleset_id).await
    }

    async fn find_version_at(
        &self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        self.inner.find_version_at(ruleset_id, at).await
    }

    async fn list_versions(&self, ruleset_id: RulesetId) -> Result<Vec<RulesetVersion>, StoreError> {
        self.inner.list_versions(ruleset_id).await
    }

    async fn begin(&self) -> Result<Box<dyn RuleTransaction>, StoreError> {
        let inner = self.inner.begin().await?;
        let fail_insert = *self.fail_inserts.lock();
        Ok(Box::new(FlakyTransaction { inner, fail_insert }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn RuleTransaction>,
    fail_insert: bool,
}

#[async_trait]
impl RuleTransaction for FlakyTransaction {
    async fn lock_ruleset(&mut self, ruleset_id: RulesetId) -> Result<(), StoreError> {
        self.inner.lock_ruleset(ruleset_id).await
    }

    async fn latest_version(
        &mut self,
        ruleset_id: RulesetId,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        self.inner.latest_version(ruleset_id).await
    }

    async fn find_active_or_overlapping(
        &mut self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Vec<RulesetVersion>, StoreError> {
        self.inner.find_active_or_overlapping(ruleset_id, at).await
    }

    async fn close_version(
        &mut self,
        version_id: VersionId,
        effective_to: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner.close_version(version_id, effective_to).await
    }

    async fn insert_version(&mut self, version: &RulesetVersion) -> Result<(), StoreError> {
        if self.fail_insert {
            return Err(StoreError::Backend("connection reset during insert".into()));
        }
        self.inner.insert_version(version).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}

#[tokio::test]
async fn failed_insert_rolls_back_window_close() {
    let store = FlakyStore::default();
    let clock = Arc::new(FixedClock::new(ts("2026-01-01T00:00:00Z")));
    let service = RulesService::new(
        Arc::new(store.clone()),
        Arc::new(store.inner.clone()),
        clock,
        ServiceConfig::default(),
    );
    let tenant = TenantId::new();
    let rs = service
        .create_ruleset(
            tenant,
            &CreateRulesetRequest {
                jurisdiction: "US-CA".into(),
                tax_type: "SALES".into(),
                name: "CA".into(),
            },
        )
        .await
        .unwrap()
        .ruleset_id;
    service
        .upsert_rule(tenant, rs, &ca_rule("CA", 1, 0.05))
        .await
        .unwrap();
    let publish = |from: &str| PublishRequest {
        effective_from: ts(from),
        change_summary: None,
    };
    service
        .publish_drafts(tenant, rs, &publish("2026-01-01"))
        .await
        .unwrap();
    let before = service.list_versions(tenant, rs).await.unwrap();

    store.fail_next_publish(true);
    let err = service
        .publish_drafts(tenant, rs, &publish("2026-02-01"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Integrity(_)));
    assert!(!err.is_client_error());
    let after = service.list_versions(tenant, rs).await.unwrap();
    assert_eq!(after, before);
    assert!(after[0].window.is_open(), "the active version was not closed");

    // The original version still serves evaluations after the cut-over date.
    let response = service
        .evaluate(tenant, &request(None, "2026-03-01T00:00:00Z", 100.0))
        .await
        .unwrap();
    assert_eq!(response.version.version, "1.0.0");

    // And the next successful publish picks up where the last good one left off.
    store.fail_next_publish(false);
    let version = service
        .publish_drafts(tenant, rs, &publish("2026-02-01"))
        .await
        .unwrap();
    assert_eq!(version.version, "1.0.1");
    assert_eq!(version.revision, 2);
}
