//! Stored records. Plain values: no lazy relations, no live connections.

use crms_core::{
    EffectiveWindow, EvaluationId, RulesetId, RulesetKey, TenantId, Timestamp, VersionId,
};
use crms_engine::Bundle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tenant's rule collection for one (jurisdiction, tax_type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub ruleset_id: RulesetId,
    pub tenant_id: TenantId,
    pub key: RulesetKey,
    pub name: String,
    pub created_at: Timestamp,
}

/// Outcome of writing a draft rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftWrite {
    Created,
    Updated,
}

/// One published version of a ruleset.
///
/// Immutable once inserted, except that `window.to` may go from open to
/// closed when a later version is published.
#[derive(Debug, Clone, PartialEq)]
pub struct RulesetVersion {
    pub version_id: VersionId,
    pub ruleset_id: RulesetId,
    /// Monotonic per ruleset, starting at 1.
    pub revision: i64,
    /// Semantic version string, e.g. `1.0.3`.
    pub version: String,
    pub window: EffectiveWindow,
    pub bundle: Bundle,
    pub bundle_hash: String,
    pub published_at: Timestamp,
    pub change_summary: Option<String>,
}

/// An append-only evaluation audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub evaluation_id: EvaluationId,
    pub tenant_id: TenantId,
    pub ruleset_id: RulesetId,
    pub version_id: VersionId,
    pub idempotency_key: Option<String>,
    /// SHA-256 hex over the canonical request.
    pub request_hash: String,
    pub input: Value,
    /// The response body, returned verbatim on replay.
    pub output: Value,
    pub created_at: Timestamp,
}
