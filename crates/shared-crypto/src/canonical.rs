//! # Canonical JSON
//!
//! A single byte form for everything that is hashed or signed: mesh message
//! envelopes, chain records, and signed-request digests.
//!
//! Canonical form is compact JSON with **lexicographically ordered object
//! keys** at every nesting level, UTF-8 encoded. Both the signing and the
//! verifying side run their value through this module, so insertion order of
//! struct fields never leaks into signatures.

use crate::CryptoError;
use serde::Serialize;
use serde_json::Value;

/// Serialize a value to canonical JSON.
///
/// The value is first converted to a `serde_json::Value`; object keys sort
/// lexicographically (serde_json's map is a `BTreeMap`), and compact
/// serialization produces no insignificant whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    let v: Value = serde_json::to_value(value)
        .map_err(|e| CryptoError::CanonicalizationFailed(e.to_string()))?;
    serde_json::to_string(&v).map_err(|e| CryptoError::CanonicalizationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sort_lexicographically() {
        let v = json!({"zeta": 1, "alpha": {"nested_z": true, "nested_a": false}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"alpha":{"nested_a":false,"nested_z":true},"zeta":1}"#
        );
    }

    #[test]
    fn struct_field_order_does_not_leak() {
        #[derive(Serialize)]
        struct Envelope {
            ttl_ms: u64,
            id: String,
        }
        let e = Envelope {
            ttl_ms: 60_000,
            id: "m-1".into(),
        };
        assert_eq!(canonical_json(&e).unwrap(), r#"{"id":"m-1","ttl_ms":60000}"#);
    }
}
