//! Backend-independent store checks, run against every backend.

#![allow(dead_code)]

use std::sync::Arc;

use crms_core::{
    EffectiveWindow, EvaluationId, RulesetId, RulesetKey, TenantId, Timestamp, VersionId,
};
use crms_engine::{Bundle, Rule};
use crms_store::{
    DraftWrite, EvaluationRecord, EvaluationStore, RuleStore, Ruleset, RulesetVersion,
};
use serde_json::json;

pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse_lenient(s).expect("valid timestamp")
}

pub fn ruleset(tenant: TenantId, jurisdiction: &str) -> Ruleset {
    Ruleset {
        ruleset_id: RulesetId::new(),
        tenant_id: tenant,
        key: RulesetKey::new(jurisdiction, "SALES").unwrap(),
        name: format!("{jurisdiction} sales"),
        created_at: ts("2026-01-01T00:00:00Z"),
    }
}

pub fn rule(id: &str, priority: i64, rate: f64) -> Rule {
    Rule::from_json(&json!({
        "rule_id": id,
        "name": format!("Rule {id}"),
        "priority": priority,
        "when": {"eq": ["transaction.jurisdiction", "US-CA"]},
        "then": {"set": {"taxable": true, "rate": rate}},
        "because": "test"
    }))
    .unwrap()
}

pub fn version(
    ruleset_id: RulesetId,
    revision: i64,
    from: &str,
    to: Option<&str>,
) -> RulesetVersion {
    let bundle = Bundle::from_drafts(vec![rule("r", 1, 0.05)]).unwrap();
    RulesetVersion {
        version_id: VersionId::new(),
        ruleset_id,
        revision,
        version: format!("1.0.{}", revision - 1),
        window: EffectiveWindow {
            from: ts(from),
            to: to.map(ts),
        },
        bundle_hash: bundle.hash().unwrap(),
        bundle,
        published_at: ts("2026-01-01T00:00:00Z"),
        change_summary: Some(format!("revision {revision}")),
    }
}

pub fn evaluation(tenant: TenantId, rs: &Ruleset, v: &RulesetVersion, key: Option<&str>) -> EvaluationRecord {
    let evaluation_id = EvaluationId::new();
    EvaluationRecord {
        evaluation_id,
        tenant_id: tenant,
        ruleset_id: rs.ruleset_id,
        version_id: v.version_id,
        idempotency_key: key.map(str::to_string),
        request_hash: "0".repeat(64),
        input: json!({"transaction": {"amount": 100}}),
        output: json!({"evaluation_id": evaluation_id.to_string()}),
        created_at: ts("2026-02-01T00:00:00Z"),
    }
}

/// Insert a ruleset and commit one version with the given window.
pub async fn seed_version<S: RuleStore>(store: &S, rs: &Ruleset, v: &RulesetVersion) {
    let mut tx = store.begin().await.unwrap();
    tx.lock_ruleset(rs.ruleset_id).await.unwrap();
    tx.insert_version(v).await.unwrap();
    tx.commit().await.unwrap();
}

pub async fn ruleset_key_is_unique_per_tenant<S: RuleStore>(store: &S) {
    let tenant = TenantId::new();
    let first = ruleset(tenant, "US-CA");
    store.insert_ruleset(&first).await.unwrap();

    let dup = ruleset(tenant, "US-CA");
    let err = store.insert_ruleset(&dup).await.unwrap_err();
    assert!(err.is_unique_violation(), "got {err:?}");

    let other_tenant = ruleset(TenantId::new(), "US-CA");
    store.insert_ruleset(&other_tenant).await.unwrap();

    let found = store.find_ruleset(tenant, &first.key).await.unwrap();
    assert_eq!(found.map(|r| r.ruleset_id), Some(first.ruleset_id));
}

pub async fn ruleset_lookup_is_tenant_scoped<S: RuleStore>(store: &S) {
    let tenant = TenantId::new();
    let rs = ruleset(tenant, "US-WA");
    store.insert_ruleset(&rs).await.unwrap();

    assert!(store.get_ruleset(tenant, rs.ruleset_id).await.unwrap().is_some());
    assert!(store
        .get_ruleset(TenantId::new(), rs.ruleset_id)
        .await
        .unwrap()
        .is_none());
}

pub async fn drafts_upsert_and_keep_position<S: RuleStore>(store: &S) {
    let rs = ruleset(TenantId::new(), "US-TX");
    store.insert_ruleset(&rs).await.unwrap();
    let at = ts("2026-01-02T00:00:00Z");

    assert_eq!(
        store.upsert_draft_rule(rs.ruleset_id, &rule("a", 1, 0.01), at).await.unwrap(),
        DraftWrite::Created
    );
    assert_eq!(
        store.upsert_draft_rule(rs.ruleset_id, &rule("b", 1, 0.02), at).await.unwrap(),
        DraftWrite::Created
    );
    assert_eq!(
        store.upsert_draft_rule(rs.ruleset_id, &rule("a", 7, 0.03), at).await.unwrap(),
        DraftWrite::Updated
    );

    let drafts = store.load_draft_rules(rs.ruleset_id).await.unwrap();
    let ids: Vec<&str> = drafts.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(drafts[0].priority, 7);
    assert_eq!(drafts[0].then.set.rate, Some(0.03));
}

pub async fn draft_for_missing_ruleset_is_not_found<S: RuleStore>(store: &S) {
    let err = store
        .upsert_draft_rule(RulesetId::new(), &rule("a", 1, 0.01), ts("2026-01-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, crms_store::StoreError::NotFound { .. }), "got {err:?}");
}

pub async fn version_windows_resolve_half_open<S: RuleStore>(store: &S) {
    let rs = ruleset(TenantId::new(), "US-NV");
    store.insert_ruleset(&rs).await.unwrap();
    let v1 = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", Some("2026-02-01T00:00:00Z"));
    let v2 = version(rs.ruleset_id, 2, "2026-02-01T00:00:00Z", None);
    seed_version(store, &rs, &v1).await;
    seed_version(store, &rs, &v2).await;

    for (at, expected) in [
        ("2026-01-31T23:59:59Z", Some(v1.version_id)),
        ("2026-02-01T00:00:00Z", Some(v2.version_id)),
        ("2025-01-01T00:00:00Z", None),
    ] {
        let found = store.find_version_at(rs.ruleset_id, ts(at)).await.unwrap();
        assert_eq!(found.map(|v| v.version_id), expected, "resolving at {at}");
    }

    let listed = store.list_versions(rs.ruleset_id).await.unwrap();
    let revisions: Vec<i64> = listed.iter().map(|v| v.revision).collect();
    assert_eq!(revisions, [1, 2]);
    assert_eq!(listed[0].bundle, v1.bundle);
    assert_eq!(listed[0].bundle_hash, v1.bundle_hash);
}

pub async fn dropped_transaction_rolls_back<S: RuleStore>(store: &S) {
    let rs = ruleset(TenantId::new(), "US-OR");
    store.insert_ruleset(&rs).await.unwrap();
    let v1 = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store, &rs, &v1).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.lock_ruleset(rs.ruleset_id).await.unwrap();
        tx.close_version(v1.version_id, ts("2026-03-01T00:00:00Z")).await.unwrap();
        tx.insert_version(&version(rs.ruleset_id, 2, "2026-03-01T00:00:00Z", None))
            .await
            .unwrap();
        // dropped without commit
    }

    let versions = store.list_versions(rs.ruleset_id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert!(versions[0].window.is_open());
}

pub async fn transaction_sees_its_own_writes<S: RuleStore>(store: &S) {
    let rs = ruleset(TenantId::new(), "US-AZ");
    store.insert_ruleset(&rs).await.unwrap();
    let v1 = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store, &rs, &v1).await;

    let mut tx = store.begin().await.unwrap();
    tx.lock_ruleset(rs.ruleset_id).await.unwrap();
    let open = tx
        .find_active_or_overlapping(rs.ruleset_id, ts("2026-02-01T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);

    tx.close_version(v1.version_id, ts("2026-02-01T00:00:00Z")).await.unwrap();
    let open = tx
        .find_active_or_overlapping(rs.ruleset_id, ts("2026-02-01T00:00:00Z"))
        .await
        .unwrap();
    assert!(open.is_empty());

    let v2 = version(rs.ruleset_id, 2, "2026-02-01T00:00:00Z", None);
    tx.insert_version(&v2).await.unwrap();
    let latest = tx.latest_version(rs.ruleset_id).await.unwrap();
    assert_eq!(latest.map(|v| v.revision), Some(2));
    tx.commit().await.unwrap();

    let listed = store.list_versions(rs.ruleset_id).await.unwrap();
    assert_eq!(listed[0].window.to, Some(ts("2026-02-01T00:00:00Z")));
    assert!(listed[1].window.is_open());
}

pub async fn lock_missing_ruleset_is_not_found<S: RuleStore>(store: &S) {
    let mut tx = store.begin().await.unwrap();
    let err = tx.lock_ruleset(RulesetId::new()).await.unwrap_err();
    assert!(matches!(err, crms_store::StoreError::NotFound { .. }), "got {err:?}");
}

pub async fn idempotency_key_dedupes<S: RuleStore + EvaluationStore>(store: &S) {
    let tenant = TenantId::new();
    let rs = ruleset(tenant, "US-CO");
    store.insert_ruleset(&rs).await.unwrap();
    let v = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store, &rs, &v).await;

    let first = evaluation(tenant, &rs, &v, Some("k-1"));
    let (stored, was_new) = store.insert_if_absent(first.clone()).await.unwrap();
    assert!(was_new);
    assert_eq!(stored, first);

    let second = evaluation(tenant, &rs, &v, Some("k-1"));
    let (stored, was_new) = store.insert_if_absent(second).await.unwrap();
    assert!(!was_new);
    assert_eq!(stored.evaluation_id, first.evaluation_id);

    let found = store.find_by_idempotency_key(tenant, "k-1").await.unwrap();
    assert_eq!(found.map(|r| r.evaluation_id), Some(first.evaluation_id));
    assert!(store
        .find_by_idempotency_key(TenantId::new(), "k-1")
        .await
        .unwrap()
        .is_none());
}

pub async fn records_without_key_always_insert<S: RuleStore + EvaluationStore>(store: &S) {
    let tenant = TenantId::new();
    let rs = ruleset(tenant, "US-UT");
    store.insert_ruleset(&rs).await.unwrap();
    let v = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store, &rs, &v).await;

    for _ in 0..3 {
        let (_, was_new) = store
            .insert_if_absent(evaluation(tenant, &rs, &v, None))
            .await
            .unwrap();
        assert!(was_new);
    }
}

pub async fn evaluation_lookup_is_tenant_scoped<S: RuleStore + EvaluationStore>(store: &S) {
    let tenant = TenantId::new();
    let rs = ruleset(tenant, "US-NM");
    store.insert_ruleset(&rs).await.unwrap();
    let v = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store, &rs, &v).await;

    let rec = evaluation(tenant, &rs, &v, None);
    store.insert_if_absent(rec.clone()).await.unwrap();

    assert_eq!(
        store.get_by_id(tenant, rec.evaluation_id).await.unwrap(),
        Some(rec.clone())
    );
    assert_eq!(store.get_by_id(TenantId::new(), rec.evaluation_id).await.unwrap(), None);
}

pub async fn concurrent_inserts_one_winner<S>(store: Arc<S>)
where
    S: RuleStore + EvaluationStore + 'static,
{
    const N: usize = 16;
    let tenant = TenantId::new();
    let rs = ruleset(tenant, "US-ID");
    store.insert_ruleset(&rs).await.unwrap();
    let v = version(rs.ruleset_id, 1, "2026-01-01T00:00:00Z", None);
    seed_version(store.as_ref(), &rs, &v).await;

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let store = Arc::clone(&store);
        let record = evaluation(tenant, &rs, &v, Some("race"));
        handles.push(tokio::spawn(async move {
            store.insert_if_absent(record).await.unwrap()
        }));
    }

    let mut winners = 0;
    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let (stored, was_new) = handle.await.unwrap();
        winners += usize::from(was_new);
        ids.insert(stored.evaluation_id);
    }
    assert_eq!(winners, 1, "exactly one insert must win");
    assert_eq!(ids.len(), 1, "every caller must see the winner's record");
}
