//! # Rule DSL
//!
//! A rule document:
//!
//! ```json
//! {
//!   "rule_id": "ca-saas-consumer",
//!   "name": "CA SaaS to consumers",
//!   "priority": 20,
//!   "when": {"all": [{"eq": ["transaction.jurisdiction", "US-CA"]}]},
//!   "then": {
//!     "set": {"taxable": true, "rate": 0.0725},
//!     "emit_obligations": [{"type": "ECONOMIC_NEXUS_MONITOR", "threshold": 100000, "window_days": 365}]
//!   },
//!   "because": "SaaS sold to California consumers is taxable."
//! }
//! ```
//!
//! [`Rule::from_json`] validates the whole document, including the condition
//! tree and an integer priority, and reports a typed [`ValidationError`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::condition::ConditionNode;
use crate::error::{json_type, ValidationError};

/// A validated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct Rule {
    /// Identifier, unique within a draft set and within a bundle.
    pub rule_id: String,
    /// Human-readable name.
    pub name: String,
    /// Higher runs first.
    pub priority: i64,
    /// Condition that makes the rule fire.
    pub when: ConditionNode,
    /// What a firing rule sets and emits.
    pub then: Action,
    /// Explanation recorded when the rule fires.
    pub because: String,
}

/// Effect of a firing rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    /// Result fields to overwrite.
    #[serde(default)]
    pub set: ActionSet,
    /// Obligations to append, in declared order.
    #[serde(default)]
    pub emit_obligations: Vec<Obligation>,
}

/// Result fields a rule may overwrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "finite_rate"
    )]
    pub rate: Option<f64>,
}

/// JSON has no spelling for NaN or infinity; refuse them rather than emit `null`.
fn finite_rate<S: Serializer>(rate: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match rate {
        Some(r) if !r.is_finite() => Err(serde::ser::Error::custom(format!(
            "rate must be a finite number, got {r}"
        ))),
        _ => rate.serialize(serializer),
    }
}

/// A downstream compliance signal. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<i64>,
}

/// Wire shape before validation.
#[derive(Deserialize)]
struct RawRule {
    rule_id: String,
    name: String,
    priority: Value,
    when: Value,
    #[serde(default)]
    then: Option<Value>,
    because: String,
}

impl Rule {
    /// Parse and validate a rule document.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let raw: RawRule =
            serde_json::from_value(value.clone()).map_err(|e| ValidationError::MalformedRule {
                reason: e.to_string(),
            })?;
        Self::try_from(raw)
    }

    /// The rule document as JSON.
    ///
    /// # Errors
    ///
    /// Fails for a rule built in code with a non-finite `rate`.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Evaluate this rule's condition.
    pub fn matches(&self, facts: &Value) -> bool {
        self.when.evaluate(facts)
    }
}

impl TryFrom<RawRule> for Rule {
    type Error = ValidationError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        if raw.rule_id.trim().is_empty() {
            return Err(ValidationError::MalformedRule {
                reason: "rule_id must be non-empty".to_string(),
            });
        }
        let priority = raw
            .priority
            .as_i64()
            .ok_or_else(|| ValidationError::NonIntegerPriority {
                rule_id: raw.rule_id.clone(),
                found: match &raw.priority {
                    Value::Number(n) => n.to_string(),
                    other => json_type(other).to_string(),
                },
            })?;
        let when = ConditionNode::parse(&raw.when)?;
        let then = match raw.then {
            None | Some(Value::Null) => Action::default(),
            Some(value) => {
                serde_json::from_value(value).map_err(|e| ValidationError::MalformedAction {
                    rule_id: raw.rule_id.clone(),
                    reason: e.to_string(),
                })?
            }
        };
        Ok(Self {
            rule_id: raw.rule_id,
            name: raw.name,
            priority,
            when,
            then,
            because: raw.because,
        })
    }
}
