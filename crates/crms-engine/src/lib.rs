//! # crms-engine: Condition Interpreter and Rule Selection
//!
//! The evaluation core. Everything here is a pure function of its inputs:
//! no I/O, no clocks, no logging, no async. Identical (bundle, facts, amount)
//! triples always produce identical results, which is what makes a stored
//! evaluation reproducible during audit.
//!
//! ## Layers
//!
//! - [`path`] resolves `a.b.c` against a nested fact tree.
//! - [`condition`] is the closed `ConditionNode` AST, its JSON DSL parser,
//!   and the recursive evaluator.
//! - [`rule`] holds the Rule DSL: rule, action and obligation types.
//! - [`bundle`] fixes the publish-time ordering of rules and computes the
//!   bundle hash.
//! - [`selector`] walks a bundle and applies the first matching rule.
//!
//! Rules are parsed and validated once, when they enter the system as
//! drafts. Evaluation never sees an unknown operator or a malformed operand.

pub mod bundle;
pub mod condition;
pub mod error;
pub mod path;
pub mod rule;
pub mod selector;

pub use bundle::Bundle;
pub use condition::ConditionNode;
pub use error::ValidationError;
pub use path::FactPath;
pub use rule::{Action, ActionSet, Obligation, Rule};
pub use selector::{round_currency, select, EvaluationResult, FiredRule, Selection};
