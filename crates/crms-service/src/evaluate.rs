//! # Evaluation
//!
//! Idempotency check, version resolution, rule selection, audit write.
//! Nothing is written until the final insert, so an abandoned evaluation
//! leaves no trace.

use crms_core::{EvaluationId, TenantId};
use crms_engine::select;
use crms_store::{EvaluationRecord, StoreError};

use crate::api::{EvaluationRequest, EvaluationResponse, Explanation, RulesetInfo, VersionInfo};
use crate::error::ServiceError;
use crate::idempotency::Recorded;
use crate::resolver::resolve_version;
use crate::service::RulesService;

impl RulesService {
    /// Evaluate a transaction for `tenant_id`.
    ///
    /// A request carrying a recorded idempotency key returns the recorded
    /// response without evaluating anything.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty jurisdiction or tax type.
    /// - `NotFound` when the tenant has no ruleset for the transaction's
    ///   jurisdiction and tax type, or no version is effective at
    ///   `effective_at`.
    /// - `Conflict` when the idempotency key was used with a different
    ///   request and payload drift is rejected.
    #[tracing::instrument(
        skip(self, request),
        fields(
            tenant_id = %tenant_id,
            idempotency_key = request.idempotency_key(),
            effective_at = %request.effective_at,
        )
    )]
    pub async fn evaluate(
        &self,
        tenant_id: TenantId,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResponse, ServiceError> {
        let key = request.transaction.ruleset_key()?;
        let request_hash = request.fingerprint()?;

        if let Some(idempotency_key) = request.idempotency_key() {
            if let Some(record) = self
                .idempotency
                .replay(tenant_id, idempotency_key, &request_hash)
                .await?
            {
                metrics::counter!("crms_evaluations_total", "outcome" => "replayed").increment(1);
                tracing::debug!(evaluation_id = %record.evaluation_id, "Replayed recorded evaluation");
                return stored_response(&record);
            }
        }

        let ruleset = self
            .rules
            .find_ruleset(tenant_id, &key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no ruleset for {key}")))?;
        let version = resolve_version(self.rules.as_ref(), &ruleset, request.effective_at).await?;

        let selection = select(
            &version.bundle,
            &request.transaction.facts(),
            request.transaction.amount,
        );

        let evaluation_id = EvaluationId::new();
        let response = EvaluationResponse {
            evaluation_id,
            ruleset: RulesetInfo::from(&ruleset.key),
            version: VersionInfo {
                version: version.version.clone(),
                bundle_hash: version.bundle_hash.clone(),
            },
            result: selection.result,
            explanation: Explanation {
                fired_rules: selection.fired_rules,
            },
        };
        let output = serde_json::to_value(&response).map_err(|e| {
            ServiceError::Validation(format!("evaluation result is not serializable: {e}"))
        })?;

        let record = EvaluationRecord {
            evaluation_id,
            tenant_id,
            ruleset_id: ruleset.ruleset_id,
            version_id: version.version_id,
            idempotency_key: request.idempotency_key().map(str::to_string),
            request_hash,
            input: request.to_json(),
            output,
            created_at: self.clock.now(),
        };

        match self.idempotency.record(record).await? {
            Recorded::Inserted(_) => {
                metrics::counter!("crms_evaluations_total", "outcome" => "computed").increment(1);
                tracing::info!(
                    evaluation_id = %evaluation_id,
                    version = %version.version,
                    fired = response.explanation.fired_rules.len(),
                    taxable = response.result.taxable,
                    "Evaluated transaction"
                );
                Ok(response)
            }
            Recorded::LostRace(winner) => {
                metrics::counter!("crms_evaluations_total", "outcome" => "race_lost").increment(1);
                tracing::info!(
                    evaluation_id = %winner.evaluation_id,
                    "Concurrent request recorded first; returning its result"
                );
                stored_response(&winner)
            }
        }
    }
}

fn stored_response(record: &EvaluationRecord) -> Result<EvaluationResponse, ServiceError> {
    serde_json::from_value(record.output.clone()).map_err(|e| {
        ServiceError::Store(StoreError::Corrupt {
            entity: "evaluation",
            reason: format!("{}: {e}", record.evaluation_id),
        })
    })
}
