//! Version resolution: which published bundle applies at an instant.

use crms_core::Timestamp;
use crms_store::{RuleStore, Ruleset, RulesetVersion};

use crate::error::ServiceError;

/// The version of `ruleset` whose effective window covers `at`.
///
/// # Errors
///
/// `NotFound` when `at` precedes the first publication or falls inside a
/// gap between windows.
pub async fn resolve_version(
    store: &dyn RuleStore,
    ruleset: &Ruleset,
    at: Timestamp,
) -> Result<RulesetVersion, ServiceError> {
    store
        .find_version_at(ruleset.ruleset_id, at)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no published version of ruleset {} effective at {at}",
                ruleset.key
            ))
        })
}
