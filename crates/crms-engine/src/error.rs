//! Validation errors for the Rule DSL.
//!
//! Every variant is raised before any mutation: a rule that fails here never
//! reaches a draft table, and a draft set that fails here never reaches a
//! published bundle.

use thiserror::Error;

/// A rule, condition or bundle was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The condition key is not one of the supported operators.
    #[error("unknown condition operator {operator:?}")]
    UnknownOperator {
        /// The unrecognised key.
        operator: String,
    },

    /// A condition is not a single-key object.
    #[error("malformed condition: {reason}")]
    MalformedCondition {
        /// What was wrong with the shape.
        reason: String,
    },

    /// An operator received the wrong number of operands.
    #[error("operator {operator:?} expects {expected}, got {found}")]
    Arity {
        /// The operator.
        operator: &'static str,
        /// Description of the expected operand shape.
        expected: &'static str,
        /// Description of what was supplied.
        found: String,
    },

    /// An operand has the wrong JSON type for its operator.
    #[error("operator {operator:?} requires {expected} operand, got {found}")]
    OperandType {
        /// The operator.
        operator: &'static str,
        /// The required operand type.
        expected: &'static str,
        /// The JSON type supplied.
        found: &'static str,
    },

    /// A leaf path is empty or has an empty segment.
    #[error("invalid fact path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Priority is not an integer.
    #[error("rule {rule_id:?}: priority must be an integer, got {found}")]
    NonIntegerPriority {
        /// The offending rule.
        rule_id: String,
        /// The supplied value.
        found: String,
    },

    /// The `then` block does not match `{set: {taxable?, rate?}, emit_obligations?}`.
    #[error("rule {rule_id:?}: malformed action: {reason}")]
    MalformedAction {
        /// The offending rule.
        rule_id: String,
        /// Deserializer diagnostic.
        reason: String,
    },

    /// A rule document is missing fields or has mistyped ones.
    #[error("malformed rule: {reason}")]
    MalformedRule {
        /// Deserializer diagnostic.
        reason: String,
    },

    /// A bundle must contain at least one rule.
    #[error("a bundle requires at least one rule")]
    EmptyBundle,

    /// Two rules in one bundle share an id.
    #[error("duplicate rule_id {rule_id:?}")]
    DuplicateRuleId {
        /// The repeated id.
        rule_id: String,
    },
}

/// JSON type name, for diagnostics.
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
