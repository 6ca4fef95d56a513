//! # crms-store: Persistence Boundary
//!
//! Plain immutable records plus the repository traits the service layer
//! composes:
//!
//! - [`RuleStore`] owns rulesets, draft rules and published versions.
//!   Publication goes through a [`RuleTransaction`] obtained from
//!   [`RuleStore::begin`]; dropping a transaction without committing it
//!   discards every staged change.
//! - [`EvaluationStore`] owns the append-only evaluation audit log, with a
//!   uniqueness guarantee on (tenant, idempotency key).
//!
//! Two backends implement both traits: [`MemoryStore`] for tests and local
//! runs, and [`PgStore`] over a `sqlx` PostgreSQL pool.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use records::{DraftWrite, EvaluationRecord, Ruleset, RulesetVersion};
pub use traits::{EvaluationStore, RuleStore, RuleTransaction};
