//! Fixtures shared by the service integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use crms_core::{FixedClock, RulesetId, TenantId, Timestamp};
use crms_service::{
    CreateRulesetRequest, EvaluationRequest, PublishRequest, RulesService, ServiceConfig,
};
use crms_store::MemoryStore;
use serde_json::{json, Value};

pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse_lenient(s).expect("valid timestamp")
}

pub struct Harness {
    pub service: RulesService,
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub tenant: TenantId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(ts("2026-01-01T00:00:00Z")));
        let service = RulesService::in_memory(store.clone(), clock.clone(), config);
        Self {
            service,
            store,
            clock,
            tenant: TenantId::new(),
        }
    }

    pub async fn ruleset(&self, jurisdiction: &str) -> RulesetId {
        self.service
            .create_ruleset(
                self.tenant,
                &CreateRulesetRequest {
                    jurisdiction: jurisdiction.to_string(),
                    tax_type: "SALES".to_string(),
                    name: format!("{jurisdiction} sales tax"),
                },
            )
            .await
            .expect("create ruleset")
            .ruleset_id
    }

    pub async fn draft(&self, ruleset_id: RulesetId, rule: Value) {
        self.service
            .upsert_rule(self.tenant, ruleset_id, &rule)
            .await
            .expect("upsert rule");
    }

    pub async fn publish(&self, ruleset_id: RulesetId, effective_from: &str) -> String {
        self.service
            .publish_drafts(
                self.tenant,
                ruleset_id,
                &PublishRequest {
                    effective_from: ts(effective_from),
                    change_summary: None,
                },
            )
            .await
            .expect("publish")
            .version
    }
}

/// A rule matching California transactions at `rate`.
pub fn ca_rule(id: &str, priority: i64, rate: f64) -> Value {
    json!({
        "rule_id": id,
        "name": format!("Rule {id}"),
        "priority": priority,
        "when": {"eq": ["transaction.jurisdiction", "US-CA"]},
        "then": {
            "set": {"taxable": true, "rate": rate},
            "emit_obligations": [{"type": "ECONOMIC_NEXUS_MONITOR", "threshold": 100000, "window_days": 365}]
        },
        "because": format!("{id} applies to California sales")
    })
}

pub fn request(key: Option<&str>, effective_at: &str, amount: f64) -> EvaluationRequest {
    serde_json::from_value(json!({
        "idempotency_key": key,
        "effective_at": effective_at,
        "transaction": {
            "jurisdiction": "US-CA",
            "tax_type": "SALES",
            "amount": amount,
            "product": {"category": "SAAS"}
        }
    }))
    .expect("valid request")
}
