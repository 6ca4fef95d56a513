//! # Condition AST and Evaluator
//!
//! Conditions arrive as single-key JSON objects:
//!
//! ```json
//! {"all": [
//!   {"eq": ["transaction.jurisdiction", "US-CA"]},
//!   {"in": ["transaction.product.category", ["SAAS", "DIGITAL"]]},
//!   {"gte": ["transaction.amount", 100]},
//!   {"exists": "transaction.buyer.tax_id"}
//! ]}
//! ```
//!
//! [`ConditionNode::parse`] turns that into a closed enum once, validating
//! operator names, operand arity, operand types and paths. Evaluation is then
//! a total function over the enum.
//!
//! ## Semantics
//!
//! Absent and `null` resolve identically (see [`crate::path`]). Every leaf
//! except `neq` fails closed on an absent value:
//!
//! | Node | True when |
//! |---|---|
//! | `eq` | value present and equal to the operand |
//! | `neq` | value present and unequal, or absent with a non-null operand |
//! | `gt` `gte` `lt` `lte` | value is a number satisfying the relation |
//! | `in` | value present and equal to some member |
//! | `exists` | value present and not the empty string |
//! | `all` | every child true (vacuously true when empty) |
//! | `any` | some child true (false when empty) |
//!
//! Equality is typed: numbers compare by numeric value (`1 == 1.0`),
//! arrays and objects compare structurally, and no other cross-type pair is
//! ever equal (`true != 1`, `"1" != 1`). Booleans are not orderable.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

use crate::error::{json_type, ValidationError};
use crate::path::FactPath;

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ConditionNode {
    /// Resolved value equals the operand.
    Eq { path: FactPath, value: Value },
    /// Resolved value differs from the operand.
    Neq { path: FactPath, value: Value },
    /// Resolved number is greater than the operand.
    Gt { path: FactPath, value: Number },
    /// Resolved number is greater than or equal to the operand.
    Gte { path: FactPath, value: Number },
    /// Resolved number is less than the operand.
    Lt { path: FactPath, value: Number },
    /// Resolved number is less than or equal to the operand.
    Lte { path: FactPath, value: Number },
    /// Resolved value is a member of the operand list.
    In { path: FactPath, values: Vec<Value> },
    /// Resolved value is present and not an empty string.
    Exists { path: FactPath },
    /// Conjunction.
    All(Vec<ConditionNode>),
    /// Disjunction.
    Any(Vec<ConditionNode>),
}

impl ConditionNode {
    /// Parse the JSON DSL form, validating the whole tree.
    pub fn parse(value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::MalformedCondition {
                reason: format!("expected an object, got {}", json_type(value)),
            })?;
        let mut entries = obj.iter();
        let (operator, operand) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => {
                return Err(ValidationError::MalformedCondition {
                    reason: "empty condition object".to_string(),
                })
            }
            _ => {
                return Err(ValidationError::MalformedCondition {
                    reason: format!("expected exactly one operator key, got {}", obj.len()),
                })
            }
        };

        match operator.as_str() {
            "eq" => {
                let (path, value) = path_and_operand("eq", operand)?;
                Ok(Self::Eq {
                    path,
                    value: value.clone(),
                })
            }
            "neq" => {
                let (path, value) = path_and_operand("neq", operand)?;
                Ok(Self::Neq {
                    path,
                    value: value.clone(),
                })
            }
            "gt" => {
                let (path, value) = path_and_number("gt", operand)?;
                Ok(Self::Gt { path, value })
            }
            "gte" => {
                let (path, value) = path_and_number("gte", operand)?;
                Ok(Self::Gte { path, value })
            }
            "lt" => {
                let (path, value) = path_and_number("lt", operand)?;
                Ok(Self::Lt { path, value })
            }
            "lte" => {
                let (path, value) = path_and_number("lte", operand)?;
                Ok(Self::Lte { path, value })
            }
            "in" => {
                let (path, members) = path_and_operand("in", operand)?;
                let values = members
                    .as_array()
                    .ok_or(ValidationError::OperandType {
                        operator: "in",
                        expected: "array",
                        found: json_type(members),
                    })?
                    .clone();
                Ok(Self::In { path, values })
            }
            "exists" => {
                let raw = operand.as_str().ok_or(ValidationError::OperandType {
                    operator: "exists",
                    expected: "string path",
                    found: json_type(operand),
                })?;
                Ok(Self::Exists {
                    path: FactPath::parse(raw)?,
                })
            }
            "all" => Ok(Self::All(children("all", operand)?)),
            "any" => Ok(Self::Any(children("any", operand)?)),
            other => Err(ValidationError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }

    /// The JSON DSL form. `parse(&node.to_json())` returns an equal node.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Eq { path, value } => json!({"eq": [path.as_str(), value]}),
            Self::Neq { path, value } => json!({"neq": [path.as_str(), value]}),
            Self::Gt { path, value } => json!({"gt": [path.as_str(), value]}),
            Self::Gte { path, value } => json!({"gte": [path.as_str(), value]}),
            Self::Lt { path, value } => json!({"lt": [path.as_str(), value]}),
            Self::Lte { path, value } => json!({"lte": [path.as_str(), value]}),
            Self::In { path, values } => json!({"in": [path.as_str(), values]}),
            Self::Exists { path } => json!({"exists": path.as_str()}),
            Self::All(nodes) => json!({"all": nodes.iter().map(Self::to_json).collect::<Vec<_>>()}),
            Self::Any(nodes) => json!({"any": nodes.iter().map(Self::to_json).collect::<Vec<_>>()}),
        }
    }

    /// Evaluate against a fact tree.
    pub fn evaluate(&self, facts: &Value) -> bool {
        match self {
            Self::Eq { path, value } => path
                .resolve(facts)
                .is_some_and(|found| values_equal(found, value)),
            Self::Neq { path, value } => match path.resolve(facts) {
                Some(found) => !values_equal(found, value),
                None => !value.is_null(),
            },
            Self::Gt { path, value } => compare_at(path, facts, value).is_some_and(Ordering::is_gt),
            Self::Gte { path, value } => compare_at(path, facts, value).is_some_and(Ordering::is_ge),
            Self::Lt { path, value } => compare_at(path, facts, value).is_some_and(Ordering::is_lt),
            Self::Lte { path, value } => compare_at(path, facts, value).is_some_and(Ordering::is_le),
            Self::In { path, values } => path
                .resolve(facts)
                .is_some_and(|found| values.iter().any(|member| values_equal(found, member))),
            Self::Exists { path } => path
                .resolve(facts)
                .is_some_and(|found| found.as_str() != Some("")),
            Self::All(nodes) => nodes.iter().all(|node| node.evaluate(facts)),
            Self::Any(nodes) => nodes.iter().any(|node| node.evaluate(facts)),
        }
    }
}

impl TryFrom<Value> for ConditionNode {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConditionNode> for Value {
    fn from(node: ConditionNode) -> Self {
        node.to_json()
    }
}

fn path_and_operand<'a>(
    operator: &'static str,
    operand: &'a Value,
) -> Result<(FactPath, &'a Value), ValidationError> {
    let pair = match operand.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        Some(other) => {
            return Err(ValidationError::Arity {
                operator,
                expected: "[path, operand]",
                found: format!("{} element(s)", other.len()),
            })
        }
        None => {
            return Err(ValidationError::Arity {
                operator,
                expected: "[path, operand]",
                found: json_type(operand).to_string(),
            })
        }
    };
    let raw = pair[0].as_str().ok_or(ValidationError::OperandType {
        operator,
        expected: "string path",
        found: json_type(&pair[0]),
    })?;
    Ok((FactPath::parse(raw)?, &pair[1]))
}

fn path_and_number(
    operator: &'static str,
    operand: &Value,
) -> Result<(FactPath, Number), ValidationError> {
    let (path, value) = path_and_operand(operator, operand)?;
    match value {
        Value::Number(n) => Ok((path, n.clone())),
        other => Err(ValidationError::OperandType {
            operator,
            expected: "number",
            found: json_type(other),
        }),
    }
}

fn children(operator: &'static str, operand: &Value) -> Result<Vec<ConditionNode>, ValidationError> {
    operand
        .as_array()
        .ok_or(ValidationError::OperandType {
            operator,
            expected: "array of conditions",
            found: json_type(operand),
        })?
        .iter()
        .map(ConditionNode::parse)
        .collect()
}

fn compare_at(path: &FactPath, facts: &Value, operand: &Number) -> Option<Ordering> {
    match path.resolve(facts)? {
        Value::Number(found) => compare_numbers(found, operand),
        _ => None,
    }
}

/// Numeric ordering. Integers compare exactly; anything else goes through
/// `f64`. `None` only for values `f64` cannot order.
pub fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Typed structural equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
