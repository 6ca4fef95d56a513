//! # Request and Response Types
//!
//! JSON shapes exchanged with the transport layer. Evaluation responses are
//! stored verbatim in the audit log and replayed from there, so
//! [`EvaluationResponse`] must survive a serialize/deserialize round trip
//! unchanged.

use crms_core::{
    sha256_hex, CanonicalBytes, CanonicalizationError, CoreError, EffectiveWindow, EvaluationId,
    RulesetId, RulesetKey, Timestamp, VersionId,
};
use crms_engine::{EvaluationResult, FiredRule};
use crms_store::{DraftWrite, RulesetVersion};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

fn default_currency() -> String {
    "USD".to_string()
}

/// The transaction under evaluation.
///
/// Fields beyond the four named ones are kept and reachable from rule paths
/// as `transaction.<field>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub jurisdiction: String,
    pub tax_type: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub amount: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// The transaction as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert(
            "jurisdiction".to_string(),
            Value::String(self.jurisdiction.clone()),
        );
        object.insert("tax_type".to_string(), Value::String(self.tax_type.clone()));
        object.insert("currency".to_string(), Value::String(self.currency.clone()));
        object.insert(
            "amount".to_string(),
            Number::from_f64(self.amount).map_or(Value::Null, Value::Number),
        );
        Value::Object(object)
    }

    /// The fact tree rules are evaluated against: `{"transaction": {...}}`.
    pub fn facts(&self) -> Value {
        let mut root = Map::new();
        root.insert("transaction".to_string(), self.to_json());
        Value::Object(root)
    }

    /// The ruleset this transaction is evaluated under.
    pub fn ruleset_key(&self) -> Result<RulesetKey, CoreError> {
        RulesetKey::new(self.jurisdiction.as_str(), self.tax_type.as_str())
    }
}

/// Body of an evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub effective_at: Timestamp,
    pub transaction: Transaction,
}

impl EvaluationRequest {
    /// The idempotency key, with an empty key treated as absent.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    /// The request as stored in the audit record.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "idempotency_key".to_string(),
            self.idempotency_key().map_or(Value::Null, |k| Value::String(k.to_string())),
        );
        object.insert(
            "effective_at".to_string(),
            Value::String(self.effective_at.to_iso8601()),
        );
        object.insert("transaction".to_string(), self.transaction.to_json());
        Value::Object(object)
    }

    /// SHA-256 hex over the canonical form of [`to_json`](Self::to_json).
    ///
    /// Independent of field order in the submitted document and of how the
    /// amount was spelled (`100` and `100.0` hash alike).
    pub fn fingerprint(&self) -> Result<String, CanonicalizationError> {
        Ok(sha256_hex(&CanonicalBytes::new(&self.to_json())?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetInfo {
    pub jurisdiction: String,
    pub tax_type: String,
}

impl From<&RulesetKey> for RulesetInfo {
    fn from(key: &RulesetKey) -> Self {
        Self {
            jurisdiction: key.jurisdiction.clone(),
            tax_type: key.tax_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub bundle_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub fired_rules: Vec<FiredRule>,
}

/// Body of an evaluation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub evaluation_id: EvaluationId,
    pub ruleset: RulesetInfo,
    pub version: VersionInfo,
    pub result: EvaluationResult,
    pub explanation: Explanation,
}

/// Request to create a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRulesetRequest {
    pub jurisdiction: String,
    pub tax_type: String,
    pub name: String,
}

/// Outcome of writing a draft rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWriteResponse {
    pub rule_id: String,
    pub state: DraftWrite,
}

/// Request to publish the current drafts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub effective_from: Timestamp,
    #[serde(default)]
    pub change_summary: Option<String>,
}

/// A published version without its bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: VersionId,
    pub ruleset_id: RulesetId,
    pub revision: i64,
    pub version: String,
    pub effective_from: Timestamp,
    pub effective_to: Option<Timestamp>,
    pub bundle_hash: String,
    pub rule_count: usize,
    pub published_at: Timestamp,
    pub change_summary: Option<String>,
}

impl From<&RulesetVersion> for VersionSummary {
    fn from(v: &RulesetVersion) -> Self {
        let EffectiveWindow { from, to } = v.window;
        Self {
            version_id: v.version_id,
            ruleset_id: v.ruleset_id,
            revision: v.revision,
            version: v.version.clone(),
            effective_from: from,
            effective_to: to,
            bundle_hash: v.bundle_hash.clone(),
            rule_count: v.bundle.len(),
            published_at: v.published_at,
            change_summary: v.change_summary.clone(),
        }
    }
}
