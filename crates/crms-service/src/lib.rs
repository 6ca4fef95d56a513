//! # crms-service: Evaluation and Administration
//!
//! Composes the pure engine with the persistence boundary:
//!
//! - [`resolver`] finds the version effective at an instant.
//! - [`publish`] turns drafts into an immutable version in one transaction.
//! - [`idempotency`] guarantees one recorded evaluation per
//!   (tenant, idempotency key), including under concurrent first requests.
//! - [`RulesService`] exposes evaluation and ruleset administration over
//!   injected stores, a clock and a [`ServiceConfig`].
//!
//! HTTP routing, authentication and tenant resolution live outside this
//! crate; callers pass an already-resolved [`TenantId`](crms_core::TenantId).

mod admin;
pub mod api;
pub mod config;
pub mod error;
mod evaluate;
pub mod idempotency;
pub mod publish;
pub mod resolver;
pub mod service;
pub mod telemetry;

pub use api::{
    CreateRulesetRequest, EvaluationRequest, EvaluationResponse, Explanation, PublishRequest,
    RuleWriteResponse, RulesetInfo, Transaction, VersionInfo, VersionSummary,
};
pub use config::{ConfigError, LogFormat, ServiceConfig, TelemetryConfig};
pub use error::ServiceError;
pub use idempotency::{IdempotencyCoordinator, Recorded};
pub use publish::next_version;
pub use resolver::resolve_version;
pub use service::RulesService;
pub use telemetry::TelemetryError;
