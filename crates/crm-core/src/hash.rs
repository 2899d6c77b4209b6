//! Deterministic content hashing.
//!
//! `content_hash` must be invariant under re-serialization order of map keys
//! and list elements that are semantically unordered.
//! We achieve that by serializing through [`serde_json::Value`] and
//! re-emitting it with all object keys sorted (`serde_json::Value::Object`
//! is a `BTreeMap`-backed map as soon as the `preserve_order` feature is
//! off, which this workspace does not enable), then hashing the resulting
//! canonical bytes with BLAKE3.

use serde::Serialize;
use serde_json::Value;

/// A 32-byte BLAKE3 digest, displayed as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Renders the digest as lowercase hex, e.g. for chunk metadata.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonicalizes a JSON value by recursively sorting object keys.
///
/// `serde_json::Value`'s default `Map` is already key-sorted (BTreeMap)
/// unless the crate's `preserve_order` feature is enabled; this function
/// does not depend on that and instead produces an explicit canonical
/// re-encoding so the invariant holds regardless of how the workspace's
/// `serde_json` feature flags evolve.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map.iter() {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Computes the deterministic content hash of any serializable value.
///
/// Hashes the canonical (sorted-keys) JSON encoding, so two structurally
/// equal values hash identically regardless of map iteration order or
/// struct field declaration order.
pub fn content_hash<T: Serialize>(value: &T) -> ContentHash {
    let raw = serde_json::to_value(value).expect("value must serialize to JSON");
    let canonical = canonicalize(&raw);
    let bytes = serde_json::to_vec(&canonical).expect("canonical value must serialize");
    let digest = blake3::hash(&bytes);
    ContentHash(*digest.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Fixed {
        b: u32,
        a: u32,
    }

    #[test]
    fn field_order_does_not_change_hash() {
        #[derive(Serialize)]
        struct A {
            a: u32,
            b: u32,
        }
        #[derive(Serialize)]
        struct B {
            b: u32,
            a: u32,
        }

        let h1 = content_hash(&A { a: 1, b: 2 });
        let h2 = content_hash(&B { b: 2, a: 1 });
        assert_eq!(h1, h2);
    }

    #[test]
    fn hashmap_iteration_order_does_not_change_hash() {
        let mut m1 = HashMap::new();
        m1.insert("x", 1);
        m1.insert("y", 2);
        m1.insert("z", 3);

        let mut m2 = HashMap::new();
        m2.insert("z", 3);
        m2.insert("x", 1);
        m2.insert("y", 2);

        assert_eq!(content_hash(&m1), content_hash(&m2));
    }

    #[test]
    fn different_content_hashes_differ() {
        let h1 = content_hash(&Fixed { a: 1, b: 2 });
        let h2 = content_hash(&Fixed { a: 1, b: 3 });
        assert_ne!(h1, h2);
    }

    #[test]
    fn hex_round_trips_length() {
        let h = content_hash(&Fixed { a: 1, b: 2 });
        assert_eq!(h.to_hex().len(), 64);
    }
}
