//! # Ruleset Administration
//!
//! Creating rulesets, writing draft rules, publishing drafts, and reading
//! back versions and audit records. Every operation is scoped to a tenant:
//! another tenant's rulesets and evaluations are reported as not found.

use crms_core::{EvaluationId, RulesetId, RulesetKey, TenantId};
use crms_engine::Rule;
use crms_store::{EvaluationRecord, Ruleset, RulesetVersion};
use serde_json::Value;

use crate::api::{CreateRulesetRequest, PublishRequest, RuleWriteResponse};
use crate::error::ServiceError;
use crate::publish::publish;
use crate::service::RulesService;

impl RulesService {
    /// Create a ruleset for (jurisdiction, tax_type).
    ///
    /// # Errors
    ///
    /// `Conflict` if the tenant already has one for that pair.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %tenant_id))]
    pub async fn create_ruleset(
        &self,
        tenant_id: TenantId,
        request: &CreateRulesetRequest,
    ) -> Result<Ruleset, ServiceError> {
        let key = RulesetKey::new(request.jurisdiction.as_str(), request.tax_type.as_str())?;
        let ruleset = Ruleset {
            ruleset_id: RulesetId::new(),
            tenant_id,
            key,
            name: request.name.clone(),
            created_at: self.clock.now(),
        };
        match self.rules.insert_ruleset(&ruleset).await {
            Ok(()) => {
                tracing::info!(ruleset_id = %ruleset.ruleset_id, key = %ruleset.key, "Created ruleset");
                Ok(ruleset)
            }
            Err(e) if e.is_unique_violation() => Err(ServiceError::Conflict(format!(
                "ruleset already exists for {}",
                ruleset.key
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a ruleset by jurisdiction and tax type.
    pub async fn find_ruleset(
        &self,
        tenant_id: TenantId,
        jurisdiction: &str,
        tax_type: &str,
    ) -> Result<Ruleset, ServiceError> {
        let key = RulesetKey::new(jurisdiction, tax_type)?;
        self.rules
            .find_ruleset(tenant_id, &key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no ruleset for {key}")))
    }

    /// Create or replace a draft rule from its JSON document.
    ///
    /// The document is parsed and validated in full before anything is
    /// written.
    #[tracing::instrument(skip(self, rule_json), fields(tenant_id = %tenant_id, ruleset_id = %ruleset_id))]
    pub async fn upsert_rule(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
        rule_json: &Value,
    ) -> Result<RuleWriteResponse, ServiceError> {
        let ruleset = self.owned_ruleset(tenant_id, ruleset_id).await?;
        let rule = Rule::from_json(rule_json)?;
        let state = self
            .rules
            .upsert_draft_rule(ruleset.ruleset_id, &rule, self.clock.now())
            .await?;
        tracing::info!(rule_id = %rule.rule_id, ?state, "Wrote draft rule");
        Ok(RuleWriteResponse {
            rule_id: rule.rule_id,
            state,
        })
    }

    /// Publish the ruleset's current drafts as its next version.
    ///
    /// # Errors
    ///
    /// `Validation` when there are no drafts or two drafts share a rule id.
    #[tracing::instrument(
        skip(self, request),
        fields(tenant_id = %tenant_id, ruleset_id = %ruleset_id, effective_from = %request.effective_from)
    )]
    pub async fn publish_drafts(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
        request: &PublishRequest,
    ) -> Result<RulesetVersion, ServiceError> {
        let ruleset = self.owned_ruleset(tenant_id, ruleset_id).await?;
        let drafts = self.rules.load_draft_rules(ruleset.ruleset_id).await?;
        publish(
            self.rules.as_ref(),
            ruleset.ruleset_id,
            drafts,
            request.effective_from,
            request.change_summary.clone(),
            self.clock.now(),
        )
        .await
    }

    /// Every published version of a ruleset, in publication order.
    pub async fn list_versions(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Vec<RulesetVersion>, ServiceError> {
        let ruleset = self.owned_ruleset(tenant_id, ruleset_id).await?;
        Ok(self.rules.list_versions(ruleset.ruleset_id).await?)
    }

    /// The audit record of one evaluation.
    pub async fn get_evaluation(
        &self,
        tenant_id: TenantId,
        evaluation_id: EvaluationId,
    ) -> Result<EvaluationRecord, ServiceError> {
        self.idempotency
            .store()
            .get_by_id(tenant_id, evaluation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("evaluation {evaluation_id}")))
    }

    async fn owned_ruleset(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Ruleset, ServiceError> {
        self.rules
            .get_ruleset(tenant_id, ruleset_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("ruleset {ruleset_id}")))
    }
}
