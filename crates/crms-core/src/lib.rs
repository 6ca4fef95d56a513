//! # crms-core: Foundational Types for the Compliance Rules Service
//!
//! This crate is the leaf of the workspace dependency graph. It defines the
//! primitives every other crate builds on: the canonical byte representation
//! used for every fingerprint, the SHA-256 digest computed over it, UTC-only
//! timestamps with half-open effective windows, an injectable clock, and the
//! identifier newtypes that keep tenants, rulesets, versions and evaluations
//! from being confused with one another.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** Bundle hashes and request hashes are
//!    computed only from `CanonicalBytes`, whose sole constructor applies key
//!    sorting and number normalization. Two logically equal JSON documents
//!    always produce the same bytes.
//!
//! 2. **`sha256_digest()` accepts only `&CanonicalBytes`.** A digest over
//!    non-canonical bytes cannot be expressed.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with microsecond
//!    precision and one rendering per instant, so the instant embedded in a
//!    request fingerprint has one spelling. Finer input is rejected.
//!
//! 4. **Time is injected.** Components read the current instant through the
//!    [`Clock`] trait; tests substitute [`FixedClock`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `crms-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::{canonical_json, CanonicalBytes};
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{EvaluationId, RulesetId, RulesetKey, TenantId, VersionId};
pub use temporal::{Clock, EffectiveWindow, FixedClock, SystemClock, Timestamp};
