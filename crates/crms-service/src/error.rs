//! # Service Error
//!
//! The caller-facing error taxonomy. Each variant carries a stable machine
//! code so a transport layer can map it to a status without inspecting
//! message text.

use crms_core::{CanonicalizationError, CoreError};
use crms_engine::ValidationError;
use crms_store::StoreError;
use thiserror::Error;

/// Errors returned by [`RulesService`](crate::RulesService) operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input was rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested ruleset, version or evaluation does not exist for this
    /// tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request collides with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A publication could not be applied atomically and was rolled back.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Infrastructure failure in the backing store.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Whether the caller can fix the request and resubmit.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_)
        )
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CanonicalizationError> for ServiceError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::UniqueViolation { .. } => Self::Conflict(err.to_string()),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ServiceError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(ServiceError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(ServiceError::Conflict("x".into()).code(), "CONFLICT");
        assert_eq!(ServiceError::Integrity("x".into()).code(), "INTEGRITY_ERROR");
        assert_eq!(
            ServiceError::Store(StoreError::Backend("down".into())).code(),
            "STORE_ERROR"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(ServiceError::Validation("x".into()).is_client_error());
        assert!(ServiceError::Conflict("x".into()).is_client_error());
        assert!(!ServiceError::Integrity("x".into()).is_client_error());
        assert!(!ServiceError::Store(StoreError::Backend("down".into())).is_client_error());
    }

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let nf: ServiceError = StoreError::NotFound {
            entity: "ruleset",
            id: "abc".into(),
        }
        .into();
        assert!(matches!(nf, ServiceError::NotFound(_)));

        let dup: ServiceError = StoreError::UniqueViolation {
            constraint: "uq".into(),
        }
        .into();
        assert!(matches!(dup, ServiceError::Conflict(_)));

        let backend: ServiceError = StoreError::Backend("timeout".into()).into();
        assert!(matches!(backend, ServiceError::Store(_)));
    }

    #[test]
    fn test_validation_error_converts() {
        let err: ServiceError = ValidationError::EmptyBundle.into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
