//! # Identifier Newtypes
//!
//! Newtype wrappers for the identifiers that cross component boundaries.
//! A `TenantId` cannot be passed where a `RulesetId` is expected, which
//! matters most in the tenant-scoped store lookups.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| CoreError::InvalidIdentifier {
                        input: s.to_string(),
                        reason: e.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(
    /// Tenant owning rulesets and evaluation records.
    TenantId
);
uuid_newtype!(
    /// A tenant's ruleset for one (jurisdiction, tax_type) pair.
    RulesetId
);
uuid_newtype!(
    /// One published, immutable version of a ruleset.
    VersionId
);
uuid_newtype!(
    /// An append-only evaluation audit record.
    EvaluationId
);

/// The natural key of a ruleset within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RulesetKey {
    /// Jurisdiction code, e.g. `US-CA`.
    pub jurisdiction: String,
    /// Tax type, e.g. `SALES`.
    pub tax_type: String,
}

impl RulesetKey {
    /// Build a key, rejecting empty components.
    pub fn new(
        jurisdiction: impl Into<String>,
        tax_type: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let jurisdiction = jurisdiction.into();
        let tax_type = tax_type.into();
        for part in [&jurisdiction, &tax_type] {
            if part.trim().is_empty() {
                return Err(CoreError::InvalidIdentifier {
                    input: part.clone(),
                    reason: "ruleset key components must be non-empty".to_string(),
                });
            }
        }
        Ok(Self {
            jurisdiction,
            tax_type,
        })
    }
}

impl std::fmt::Display for RulesetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.jurisdiction, self.tax_type)
    }
}
