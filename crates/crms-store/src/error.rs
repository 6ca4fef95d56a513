//! Storage errors.

use thiserror::Error;

/// Failure at the persistence boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Constraint or index name.
        constraint: String,
    },

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row.
        entity: &'static str,
        /// Identifier looked up.
        id: String,
    },

    /// A stored row could not be decoded into a record.
    #[error("corrupt stored {entity}: {reason}")]
    Corrupt {
        /// Kind of row.
        entity: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },

    /// A record could not be encoded for storage.
    #[error("cannot encode {entity}: {reason}")]
    Encode {
        /// Kind of row.
        entity: &'static str,
        /// Serializer diagnostic.
        reason: String,
    },

    /// Any other backend failure (connection, protocol, timeout).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is a uniqueness conflict.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            _ => Self::Backend(err.to_string()),
        }
    }
}
