//! # Bundle: Publish-Time Ordering and Content Hash
//!
//! A bundle is the frozen, ordered rule list embedded in one published
//! version.
//!
//! ## Ordering contract
//!
//! [`Bundle::from_drafts`] sorts by priority, highest first. Rules with equal
//! priority keep their relative draft order, which is the order the drafts
//! were first created in (updating a draft does not move it). The resulting
//! order is stored with the version and is what the bundle hash covers;
//! [`Bundle::from_published`] takes a stored order as-is and never re-sorts.
//!
//! ## Hash
//!
//! `bundle_hash` is the SHA-256 of the canonical JSON of the ordered rule
//! array (not of the `{"rules": [...]}` wrapper that is stored).

use std::collections::HashSet;

use crms_core::{sha256_hex, CanonicalBytes, CanonicalizationError};
use serde_json::{json, Value};

use crate::error::ValidationError;
use crate::rule::Rule;

/// An immutable, priority-ordered rule list.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    rules: Vec<Rule>,
}

impl Bundle {
    /// Freeze a draft set into publish order.
    ///
    /// # Errors
    ///
    /// `EmptyBundle` for no drafts, `DuplicateRuleId` for a repeated id.
    pub fn from_drafts(drafts: Vec<Rule>) -> Result<Self, ValidationError> {
        if drafts.is_empty() {
            return Err(ValidationError::EmptyBundle);
        }
        let mut seen = HashSet::with_capacity(drafts.len());
        for rule in &drafts {
            if !seen.insert(rule.rule_id.as_str()) {
                return Err(ValidationError::DuplicateRuleId {
                    rule_id: rule.rule_id.clone(),
                });
            }
        }
        let mut rules = drafts;
        // Stable: ties keep draft order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules })
    }

    /// Wrap a rule list read back from storage, keeping its order.
    pub fn from_published(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Parse the stored `{"rules": [...]}` document.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let rules = value
            .get("rules")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::MalformedRule {
                reason: "bundle document must have a \"rules\" array".to_string(),
            })?
            .iter()
            .map(Rule::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_published(rules))
    }

    /// The stored form, `{"rules": [...]}`.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({"rules": self.rules_json()?}))
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the bundle has no rules. Only possible via `from_published`.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// SHA-256 hex over the canonical ordered rule array.
    pub fn hash(&self) -> Result<String, CanonicalizationError> {
        let canonical = CanonicalBytes::new(&self.rules_json()?)?;
        Ok(sha256_hex(&canonical))
    }

    fn rules_json(&self) -> Result<Vec<Value>, serde_json::Error> {
        self.rules.iter().map(Rule::to_json).collect()
    }
}
