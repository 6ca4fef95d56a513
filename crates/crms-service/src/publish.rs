//! # Publication Workflow
//!
//! Turns a set of draft rules into an immutable, content-addressed version.
//!
//! Validation (non-empty, distinct rule ids) and hashing happen before the
//! store is touched. Everything after that runs inside one
//! [`RuleTransaction`]: lock the ruleset, read the latest revision, close
//! every window that covers or extends past `effective_from`, insert the new
//! open-ended version, commit. Any failure after the lock drops the
//! transaction uncommitted, which rolls all of it back.

use crms_core::{EffectiveWindow, RulesetId, Timestamp, VersionId};
use crms_engine::{Bundle, Rule};
use crms_store::{RuleStore, RuleTransaction, RulesetVersion, StoreError};

use crate::error::ServiceError;

/// The version string that follows `previous`.
///
/// `None` yields `1.0.0`. A `MAJOR.MINOR.PATCH` string has its patch
/// incremented. Anything else yields `1.0.1`.
pub fn next_version(previous: Option<&str>) -> String {
    let Some(previous) = previous else {
        return "1.0.0".to_string();
    };
    let parts: Vec<&str> = previous.trim().split('.').collect();
    let parsed = match parts.as_slice() {
        [major, minor, patch] => major
            .parse::<u64>()
            .ok()
            .zip(minor.parse::<u64>().ok())
            .zip(patch.parse::<u64>().ok().and_then(|p| p.checked_add(1))),
        _ => None,
    };
    match parsed {
        Some(((major, minor), patch)) => format!("{major}.{minor}.{patch}"),
        None => "1.0.1".to_string(),
    }
}

/// Publish `drafts` as the next version of `ruleset_id`.
///
/// # Errors
///
/// - `Validation` for an empty draft set or duplicate rule ids.
/// - `NotFound` if the ruleset does not exist.
/// - `Integrity` if any write fails after the ruleset is locked; nothing is
///   applied in that case.
pub async fn publish(
    store: &dyn RuleStore,
    ruleset_id: RulesetId,
    drafts: Vec<Rule>,
    effective_from: Timestamp,
    change_summary: Option<String>,
    published_at: Timestamp,
) -> Result<RulesetVersion, ServiceError> {
    let bundle = Bundle::from_drafts(drafts)?;
    let bundle_hash = bundle.hash()?;

    let mut tx = store.begin().await?;
    tx.lock_ruleset(ruleset_id).await?;

    let staged = PendingVersion {
        ruleset_id,
        bundle,
        bundle_hash,
        effective_from,
        change_summary,
        published_at,
    };
    let version = staged
        .apply(&mut *tx)
        .await
        .map_err(|e| rolled_back(ruleset_id, e))?;
    tx.commit().await.map_err(|e| rolled_back(ruleset_id, e))?;

    metrics::counter!("crms_publications_total").increment(1);
    tracing::info!(
        ruleset_id = %ruleset_id,
        version = %version.version,
        revision = version.revision,
        bundle_hash = %version.bundle_hash,
        effective_from = %effective_from,
        "Published ruleset version"
    );
    Ok(version)
}

fn rolled_back(ruleset_id: RulesetId, err: StoreError) -> ServiceError {
    tracing::error!(ruleset_id = %ruleset_id, error = %err, "Publication rolled back");
    ServiceError::Integrity(format!(
        "publication of ruleset {ruleset_id} rolled back: {err}"
    ))
}

struct PendingVersion {
    ruleset_id: RulesetId,
    bundle: Bundle,
    bundle_hash: String,
    effective_from: Timestamp,
    change_summary: Option<String>,
    published_at: Timestamp,
}

impl PendingVersion {
    async fn apply(self, tx: &mut dyn RuleTransaction) -> Result<RulesetVersion, StoreError> {
        let latest = tx.latest_version(self.ruleset_id).await?;
        let revision = latest.as_ref().map_or(1, |v| v.revision + 1);
        let version = next_version(latest.as_ref().map(|v| v.version.as_str()));

        let superseded = tx
            .find_active_or_overlapping(self.ruleset_id, self.effective_from)
            .await?;
        for old in &superseded {
            let closed = old.window.closed_at(self.effective_from);
            if let Some(to) = closed.to {
                tx.close_version(old.version_id, to).await?;
                tracing::debug!(
                    version_id = %old.version_id,
                    version = %old.version,
                    effective_to = %to,
                    "Closed superseded version"
                );
            }
        }

        let record = RulesetVersion {
            version_id: VersionId::new(),
            ruleset_id: self.ruleset_id,
            revision,
            version,
            window: EffectiveWindow::open(self.effective_from),
            bundle: self.bundle,
            bundle_hash: self.bundle_hash,
            published_at: self.published_at,
            change_summary: self.change_summary,
        };
        tx.insert_version(&record).await?;
        Ok(record)
    }
}
