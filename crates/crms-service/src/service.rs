//! The service handle: stores, clock and configuration, injected once.

use std::sync::Arc;

use crms_core::{Clock, SystemClock};
use crms_store::{EvaluationStore, MemoryStore, PgStore, RuleStore};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::idempotency::IdempotencyCoordinator;

/// Entry point for evaluation and ruleset administration.
///
/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct RulesService {
    pub(crate) rules: Arc<dyn RuleStore>,
    pub(crate) idempotency: IdempotencyCoordinator,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: ServiceConfig,
}

impl std::fmt::Debug for RulesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesService")
            .field("idempotency", &self.idempotency)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RulesService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        evaluations: Arc<dyn EvaluationStore>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let idempotency = IdempotencyCoordinator::new(evaluations, config.reject_payload_drift);
        Self {
            rules,
            idempotency,
            clock,
            config,
        }
    }

    /// A service over one shared [`MemoryStore`].
    pub fn in_memory(store: MemoryStore, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store, clock, config)
    }

    /// Build the service `config` describes, on the wall clock.
    ///
    /// Connects to PostgreSQL when `database_url` is set, otherwise starts
    /// with an empty in-memory store.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, ServiceError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        match config.database_url.as_deref() {
            Some(url) => {
                let store = Arc::new(
                    PgStore::connect(url, config.max_connections, config.acquire_timeout())
                        .await
                        .map_err(ServiceError::Store)?,
                );
                Ok(Self::new(store.clone(), store, clock, config))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory store");
                Ok(Self::in_memory(MemoryStore::new(), clock, config))
            }
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
