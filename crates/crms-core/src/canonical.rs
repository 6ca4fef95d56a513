//! # Canonical JSON
//!
//! Fingerprints in this service (the bundle hash of a published version and
//! the request hash of an evaluation) are SHA-256 digests of canonical JSON.
//! [`CanonicalBytes`] is the only type a digest accepts, and its only
//! constructor runs the normalization below, so a fingerprint over ad-hoc
//! `serde_json::to_vec()` output cannot be written.
//!
//! ## Normalization Rules
//!
//! 1. **Object keys sorted** at every nesting level (RFC 8785 ordering, which
//!    coincides with lexicographic order for keys in the Basic Multilingual
//!    Plane).
//! 2. **Arrays preserve order.**
//! 3. **Booleans stay booleans.** `true` and `1` never canonicalize alike.
//! 4. **One spelling per number.** Integral floats in the exactly
//!    representable range collapse to integers, so `100` and `100.0` produce
//!    identical bytes; other floats use the shortest round-trip form.
//! 5. **Strings pass through unchanged** (UTF-8, no `\u` escaping of
//!    non-ASCII characters).
//! 6. **Other scalars** are stringified by their `Serialize` implementation
//!    (timestamps, identifiers, non-string map keys).
//!
//! The normalized value is written by `serde_jcs` (RFC 8785), which sorts
//! keys and emits no insignificant whitespace.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::CanonicalizationError;

/// Largest integer magnitude an `f64` represents exactly (2^53).
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Bytes produced exclusively by JCS canonicalization with number
/// normalization.
///
/// # Invariants
///
/// - The only constructor is `CanonicalBytes::new()`.
/// - Keys are sorted, separators are compact, output is valid UTF-8 JSON.
/// - Logically equal inputs (same keys, same values, any key order, any
///   numeric spelling) yield byte-identical output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if the value
    /// cannot be represented as JSON (for example a map with non-scalar keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let normalized = normalize_json_value(value);
        let bytes = serialize_canonical(&normalized)?;
        Ok(Self(bytes))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the canonical bytes as a string slice.
    ///
    /// Always valid: the bytes are produced from a Rust `String`.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Canonical JSON text for a serializable value.
///
/// Convenience wrapper for callers that need the string form (audit exports,
/// diagnostics). Digest computation should go through [`CanonicalBytes`].
pub fn canonical_json(obj: &impl Serialize) -> Result<String, CanonicalizationError> {
    CanonicalBytes::new(obj).map(|cb| cb.as_str().to_owned())
}

/// Recursively normalize JSON values.
///
/// `null`, `bool` and `string` pass through. Integers pass through. Floats
/// with no fractional part and a magnitude below 2^53 become integers.
/// Objects and arrays recurse; key ordering is left to the JCS serializer.
fn normalize_json_value(value: Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => value,
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_json_value(v)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.into_iter().map(normalize_json_value).collect()),
    }
}

fn normalize_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_F64_INT => Number::from(f as i64),
        _ => n,
    }
}

/// Serialize a JSON value in JCS-canonical form (RFC 8785).
fn serialize_canonical(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let s = serde_jcs::to_string(value)?;
    Ok(s.into_bytes())
}
