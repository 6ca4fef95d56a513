//! # PostgreSQL Backend
//!
//! `sqlx` over a `PgPool`. Expected tables:
//!
//! - `rulesets` with a unique constraint on (tenant_id, jurisdiction, tax_type)
//! - `rules` (drafts) keyed by (ruleset_id, rule_id), ordered by `draft_seq`
//! - `ruleset_versions` with a unique constraint on (ruleset_id, revision)
//! - `evaluations` with a partial unique index on (tenant_id, idempotency_key)
//!   where the key is not null
//!
//! Schema creation and migration are owned by the deployment, not by this
//! crate.
//!
//! Publication runs in one database transaction that first takes a row lock
//! on the ruleset (`SELECT ... FOR UPDATE`), so concurrent publishers of the
//! same ruleset queue up and readers only ever see committed states.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crms_core::{
    EffectiveWindow, EvaluationId, RulesetId, RulesetKey, TenantId, Timestamp, VersionId,
};
use crms_engine::{Bundle, Rule};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::StoreError;
use crate::records::{DraftWrite, EvaluationRecord, Ruleset, RulesetVersion};
use crate::traits::{EvaluationStore, RuleStore, RuleTransaction};

const VERSION_COLUMNS: &str = "version_id, ruleset_id, revision, version, effective_from, \
     effective_to, bundle_hash, bundle_json, published_at, change_summary";

const EVALUATION_COLUMNS: &str = "evaluation_id, tenant_id, ruleset_id, version_id, \
     idempotency_key, request_hash, input_json, output_json, created_at";

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn insert_ruleset(&self, ruleset: &Ruleset) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rulesets (ruleset_id, tenant_id, jurisdiction, tax_type, name, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(ruleset.ruleset_id.0)
        .bind(ruleset.tenant_id.0)
        .bind(&ruleset.key.jurisdiction)
        .bind(&ruleset.key.tax_type)
        .bind(&ruleset.name)
        .bind(*ruleset.created_at.as_datetime())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_ruleset(
        &self,
        tenant_id: TenantId,
        key: &RulesetKey,
    ) -> Result<Option<Ruleset>, StoreError> {
        let row = sqlx::query_as::<_, RulesetRow>(
            "SELECT ruleset_id, tenant_id, jurisdiction, tax_type, name, created_at
             FROM rulesets WHERE tenant_id = $1 AND jurisdiction = $2 AND tax_type = $3",
        )
        .bind(tenant_id.0)
        .bind(&key.jurisdiction)
        .bind(&key.tax_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RulesetRow::into_record))
    }

    async fn get_ruleset(
        &self,
        tenant_id: TenantId,
        ruleset_id: RulesetId,
    ) -> Result<Option<Ruleset>, StoreError> {
        let row = sqlx::query_as::<_, RulesetRow>(
            "SELECT ruleset_id, tenant_id, jurisdiction, tax_type, name, created_at
             FROM rulesets WHERE ruleset_id = $1 AND tenant_id = $2",
        )
        .bind(ruleset_id.0)
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RulesetRow::into_record))
    }

    async fn upsert_draft_rule(
        &self,
        ruleset_id: RulesetId,
        rule: &Rule,
        updated_at: Timestamp,
    ) -> Result<DraftWrite, StoreError> {
        let rule_json = rule.to_json().map_err(|e| encode_error("rule", e))?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM rulesets WHERE ruleset_id = $1)")
                .bind(ruleset_id.0)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(StoreError::NotFound {
                entity: "ruleset",
                id: ruleset_id.to_string(),
            });
        }

        // `xmax = 0` only for a freshly inserted row.
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO rules (ruleset_id, rule_id, name, priority, rule_json, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (ruleset_id, rule_id) DO UPDATE
             SET name = EXCLUDED.name, priority = EXCLUDED.priority,
                 rule_json = EXCLUDED.rule_json, updated_at = EXCLUDED.updated_at
             RETURNING (xmax = 0)",
        )
        .bind(ruleset_id.0)
        .bind(&rule.rule_id)
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule_json)
        .bind(*updated_at.as_datetime())
        .fetch_one(&self.pool)
        .await?;

        Ok(if inserted {
            DraftWrite::Created
        } else {
            DraftWrite::Updated
        })
    }

    async fn load_draft_rules(&self, ruleset_id: RulesetId) -> Result<Vec<Rule>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT rule_json FROM rules WHERE ruleset_id = $1 ORDER BY draft_seq",
        )
        .bind(ruleset_id.0)
        .fetch_all(&self.pool)
        .await?;
        docs.iter()
            .map(|doc| {
                Rule::from_json(doc).map_err(|e| StoreError::Corrupt {
                    entity: "draft rule",
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn find_version_at(
        &self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        let row = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ruleset_versions
             WHERE ruleset_id = $1 AND effective_from <= $2
               AND (effective_to IS NULL OR effective_to > $2)
             ORDER BY revision DESC LIMIT 1"
        ))
        .bind(ruleset_id.0)
        .bind(*at.as_datetime())
        .fetch_optional(&self.pool)
        .await?;
        row.map(VersionRow::into_record).transpose()
    }

    async fn list_versions(&self, ruleset_id: RulesetId) -> Result<Vec<RulesetVersion>, StoreError> {
        let rows = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ruleset_versions
             WHERE ruleset_id = $1 ORDER BY revision"
        ))
        .bind(ruleset_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(VersionRow::into_record).collect()
    }

    async fn begin(&self) -> Result<Box<dyn RuleTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// A publication transaction. Rolled back by `sqlx` when dropped uncommitted.
struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RuleTransaction for PgTransaction {
    async fn lock_ruleset(&mut self, ruleset_id: RulesetId) -> Result<(), StoreError> {
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT ruleset_id FROM rulesets WHERE ruleset_id = $1 FOR UPDATE")
                .bind(ruleset_id.0)
                .fetch_optional(&mut *self.tx)
                .await?;
        locked.map(|_| ()).ok_or_else(|| StoreError::NotFound {
            entity: "ruleset",
            id: ruleset_id.to_string(),
        })
    }

    async fn latest_version(
        &mut self,
        ruleset_id: RulesetId,
    ) -> Result<Option<RulesetVersion>, StoreError> {
        let row = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ruleset_versions
             WHERE ruleset_id = $1 ORDER BY revision DESC LIMIT 1"
        ))
        .bind(ruleset_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(VersionRow::into_record).transpose()
    }

    async fn find_active_or_overlapping(
        &mut self,
        ruleset_id: RulesetId,
        at: Timestamp,
    ) -> Result<Vec<RulesetVersion>, StoreError> {
        let rows = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ruleset_versions
             WHERE ruleset_id = $1 AND (effective_to IS NULL OR effective_to > $2)
             ORDER BY revision"
        ))
        .bind(ruleset_id.0)
        .bind(*at.as_datetime())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(VersionRow::into_record).collect()
    }

    async fn close_version(
        &mut self,
        version_id: VersionId,
        effective_to: Timestamp,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE ruleset_versions SET effective_to = $1 WHERE version_id = $2")
                .bind(*effective_to.as_datetime())
                .bind(version_id.0)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "ruleset version",
                id: version_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_version(&mut self, version: &RulesetVersion) -> Result<(), StoreError> {
        let bundle_json = version
            .bundle
            .to_json()
            .map_err(|e| encode_error("bundle", e))?;
        sqlx::query(&format!(
            "INSERT INTO ruleset_versions ({VERSION_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(version.version_id.0)
        .bind(version.ruleset_id.0)
        .bind(version.revision)
        .bind(&version.version)
        .bind(*version.window.from.as_datetime())
        .bind(version.window.to.map(|t| *t.as_datetime()))
        .bind(&version.bundle_hash)
        .bind(bundle_json)
        .bind(*version.published_at.as_datetime())
        .bind(&version.change_summary)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for PgStore {
    async fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<EvaluationRecord>, StoreError> {
        let row = sqlx::query_as::<_, EvaluationRow>(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations
             WHERE tenant_id = $1 AND idempotency_key = $2"
        ))
        .bind(tenant_id.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EvaluationRow::into_record))
    }

    async fn insert_if_absent(
        &self,
        record: EvaluationRecord,
    ) -> Result<(EvaluationRecord, bool), StoreError> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO evaluations ({EVALUATION_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(record.evaluation_id.0)
        .bind(record.tenant_id.0)
        .bind(record.ruleset_id.0)
        .bind(record.version_id.0)
        .bind(&record.idempotency_key)
        .bind(&record.request_hash)
        .bind(&record.input)
        .bind(&record.output)
        .bind(*record.created_at.as_datetime())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok((record, true)),
            Err(err) => {
                let err = StoreError::from(err);
                let Some(key) = record.idempotency_key.as_deref() else {
                    return Err(err);
                };
                if !err.is_unique_violation() {
                    return Err(err);
                }
                tracing::debug!(
                    tenant_id = %record.tenant_id,
                    idempotency_key = key,
                    "idempotency key already recorded, fetching stored evaluation"
                );
                match self.find_by_idempotency_key(record.tenant_id, key).await? {
                    Some(winner) => Ok((winner, false)),
                    None => Err(err),
                }
            }
        }
    }

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        evaluation_id: EvaluationId,
    ) -> Result<Option<EvaluationRecord>, StoreError> {
        let row = sqlx::query_as::<_, EvaluationRow>(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations
             WHERE evaluation_id = $1 AND tenant_id = $2"
        ))
        .bind(evaluation_id.0)
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EvaluationRow::into_record))
    }
}

fn encode_error(entity: &'static str, err: serde_json::Error) -> StoreError {
    StoreError::Encode {
        entity,
        reason: err.to_string(),
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct RulesetRow {
    ruleset_id: Uuid,
    tenant_id: Uuid,
    jurisdiction: String,
    tax_type: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl RulesetRow {
    fn into_record(self) -> Ruleset {
        Ruleset {
            ruleset_id: RulesetId(self.ruleset_id),
            tenant_id: TenantId(self.tenant_id),
            key: RulesetKey {
                jurisdiction: self.jurisdiction,
                tax_type: self.tax_type,
            },
            name: self.name,
            created_at: Timestamp::from_utc(self.created_at),
        }
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct VersionRow {
    version_id: Uuid,
    ruleset_id: Uuid,
    revision: i64,
    version: String,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
    bundle_hash: String,
    bundle_json: Value,
    published_at: DateTime<Utc>,
    change_summary: Option<String>,
}

impl VersionRow {
    fn into_record(self) -> Result<RulesetVersion, StoreError> {
        let bundle = Bundle::from_json(&self.bundle_json).map_err(|e| StoreError::Corrupt {
            entity: "ruleset version",
            reason: format!("{}: {e}", self.version_id),
        })?;
        Ok(RulesetVersion {
            version_id: VersionId(self.version_id),
            ruleset_id: RulesetId(self.ruleset_id),
            revision: self.revision,
            version: self.version,
            window: EffectiveWindow {
                from: Timestamp::from_utc(self.effective_from),
                to: self.effective_to.map(Timestamp::from_utc),
            },
            bundle,
            bundle_hash: self.bundle_hash,
            published_at: Timestamp::from_utc(self.published_at),
            change_summary: self.change_summary,
        })
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct EvaluationRow {
    evaluation_id: Uuid,
    tenant_id: Uuid,
    ruleset_id: Uuid,
    version_id: Uuid,
    idempotency_key: Option<String>,
    request_hash: String,
    input_json: Value,
    output_json: Value,
    created_at: DateTime<Utc>,
}

impl EvaluationRow {
    fn into_record(self) -> EvaluationRecord {
        EvaluationRecord {
            evaluation_id: EvaluationId(self.evaluation_id),
            tenant_id: TenantId(self.tenant_id),
            ruleset_id: RulesetId(self.ruleset_id),
            version_id: VersionId(self.version_id),
            idempotency_key: self.idempotency_key,
            request_hash: self.request_hash,
            input: self.input_json,
            output: self.output_json,
            created_at: Timestamp::from_utc(self.created_at),
        }
    }
}
