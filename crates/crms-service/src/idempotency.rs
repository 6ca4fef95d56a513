//! # Idempotency Coordinator
//!
//! At most one logical evaluation per (tenant, idempotency key).
//!
//! A key moves Unseen -> Computing -> Recorded. A key already Recorded
//! short-circuits before any version lookup and the stored response is
//! replayed. Two first requests racing on the same key both compute, but the
//! store admits exactly one record; the loser is handed the winner's record
//! and replays it instead of failing.
//!
//! A reused key whose request fingerprint differs from the stored one is
//! payload drift. Depending on configuration it is rejected as a conflict or
//! logged and replayed.

use std::sync::Arc;

use crms_core::TenantId;
use crms_store::{EvaluationRecord, EvaluationStore};

use crate::error::ServiceError;

/// Result of recording a freshly computed evaluation.
#[derive(Debug)]
pub enum Recorded {
    /// This call stored the record.
    Inserted(EvaluationRecord),
    /// A concurrent request with the same key stored first.
    LostRace(EvaluationRecord),
}

/// Coordinates idempotent evaluation over an [`EvaluationStore`].
#[derive(Clone)]
pub struct IdempotencyCoordinator {
    store: Arc<dyn EvaluationStore>,
    reject_payload_drift: bool,
}

impl std::fmt::Debug for IdempotencyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCoordinator")
            .field("reject_payload_drift", &self.reject_payload_drift)
            .finish_non_exhaustive()
    }
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn EvaluationStore>, reject_payload_drift: bool) -> Self {
        Self {
            store,
            reject_payload_drift,
        }
    }

    /// The underlying audit store.
    pub fn store(&self) -> &dyn EvaluationStore {
        self.store.as_ref()
    }

    /// The recorded evaluation for `key`, if any.
    ///
    /// # Errors
    ///
    /// `Conflict` when the stored fingerprint differs from `request_hash`
    /// and drift is rejected.
    pub async fn replay(
        &self,
        tenant_id: TenantId,
        key: &str,
        request_hash: &str,
    ) -> Result<Option<EvaluationRecord>, ServiceError> {
        match self.store.find_by_idempotency_key(tenant_id, key).await? {
            Some(record) => self.check_drift(record, request_hash).map(Some),
            None => Ok(None),
        }
    }

    /// Persist a computed evaluation, or adopt the record that beat it.
    pub async fn record(&self, record: EvaluationRecord) -> Result<Recorded, ServiceError> {
        let request_hash = record.request_hash.clone();
        let (stored, inserted) = self.store.insert_if_absent(record).await?;
        if inserted {
            Ok(Recorded::Inserted(stored))
        } else {
            self.check_drift(stored, &request_hash).map(Recorded::LostRace)
        }
    }

    fn check_drift(
        &self,
        record: EvaluationRecord,
        request_hash: &str,
    ) -> Result<EvaluationRecord, ServiceError> {
        if record.request_hash == request_hash {
            return Ok(record);
        }
        let key = record.idempotency_key.as_deref().unwrap_or_default();
        if self.reject_payload_drift {
            return Err(ServiceError::Conflict(format!(
                "idempotency key {key:?} was already used with a different request"
            )));
        }
        tracing::warn!(
            idempotency_key = key,
            evaluation_id = %record.evaluation_id,
            "Idempotency key reused with a different payload; replaying original result"
        );
        Ok(record)
    }
}
