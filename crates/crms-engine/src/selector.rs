//! # Rule Selector: First Match Wins
//!
//! [`select`] scans a bundle in its stored order and applies the action of
//! the first rule whose condition holds. Later rules are never evaluated.
//! With no match the result is the default: not taxable, zero rate, zero tax,
//! no obligations, empty explanation.
//!
//! `tax_amount` is `rate * amount` rounded half-to-even to two decimal places
//! using exact decimal arithmetic, so `0.0725 * 100` is `7.25` and not
//! `7.249999...`.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::Bundle;
use crate::rule::{Obligation, Rule};

/// Determination for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub taxable: bool,
    pub rate: f64,
    pub tax_amount: f64,
    pub obligations: Vec<Obligation>,
}

impl Default for EvaluationResult {
    fn default() -> Self {
        Self {
            taxable: false,
            rate: 0.0,
            tax_amount: 0.0,
            obligations: Vec::new(),
        }
    }
}

/// Explanation entry for the rule that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredRule {
    pub rule_id: String,
    pub name: String,
    pub because: String,
}

impl From<&Rule> for FiredRule {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            name: rule.name.clone(),
            because: rule.because.clone(),
        }
    }
}

/// Output of [`select`]. `fired_rules` holds at most one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub result: EvaluationResult,
    pub fired_rules: Vec<FiredRule>,
}

/// Apply the first matching rule of `bundle` to `facts`.
pub fn select(bundle: &Bundle, facts: &Value, amount: f64) -> Selection {
    bundle
        .rules()
        .iter()
        .find(|rule| rule.matches(facts))
        .map_or_else(Selection::default, |rule| apply(rule, amount))
}

fn apply(rule: &Rule, amount: f64) -> Selection {
    let defaults = EvaluationResult::default();
    let rate = rule.then.set.rate.unwrap_or(defaults.rate);
    Selection {
        result: EvaluationResult {
            taxable: rule.then.set.taxable.unwrap_or(defaults.taxable),
            rate,
            tax_amount: round_currency(rate, amount),
            obligations: rule.then.emit_obligations.clone(),
        },
        fired_rules: vec![FiredRule::from(rule)],
    }
}

/// `rate * amount` rounded half-to-even to two decimal places.
///
/// Computed in `Decimal` from the shortest decimal spelling of each operand.
/// Falls back to binary floating point only when an operand is outside the
/// `Decimal` range.
pub fn round_currency(rate: f64, amount: f64) -> f64 {
    let exact = to_decimal(rate)
        .zip(to_decimal(amount))
        .and_then(|(r, a)| r.checked_mul(a))
        .map(|product| product.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
        .and_then(|rounded| rounded.to_string().parse::<f64>().ok());
    exact.unwrap_or_else(|| (rate * amount * 100.0).round() / 100.0)
}

fn to_decimal(x: f64) -> Option<Decimal> {
    if !x.is_finite() {
        return None;
    }
    Decimal::from_str(&x.to_string()).ok()
}
