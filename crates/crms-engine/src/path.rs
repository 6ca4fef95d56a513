//! # Path Resolver
//!
//! A [`FactPath`] is a validated dotted path such as `transaction.buyer.type`.
//! [`FactPath::resolve`] walks it through a nested fact tree one object key
//! at a time. There is no array indexing: a segment applied to anything other
//! than an object yields "absent".
//!
//! Absent and explicit `null` are the same thing to every caller: both
//! resolve to `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// A non-empty dotted path with no empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FactPath {
    raw: String,
    segments: Vec<String>,
}

impl FactPath {
    /// Parse and validate a dotted path.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::InvalidPath {
                path: raw.to_string(),
                reason: "path must be non-empty",
            });
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ValidationError::InvalidPath {
                path: raw.to_string(),
                reason: "path segments must be non-empty",
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The dotted form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve against `tree`. `None` means absent or null.
    pub fn resolve<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        let found = self
            .segments
            .iter()
            .try_fold(tree, |current, segment| current.as_object()?.get(segment))?;
        (!found.is_null()).then_some(found)
    }
}

impl TryFrom<String> for FactPath {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<FactPath> for String {
    fn from(path: FactPath) -> Self {
        path.raw
    }
}

impl std::fmt::Display for FactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
