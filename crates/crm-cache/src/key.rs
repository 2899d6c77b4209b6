//! Cache key derivation.
//!
//! Key is a stable hash of `(data_type, object_ref, parameter_tuple,
//! schema_version)`, computed with the same canonical-JSON-plus-BLAKE3
//! scheme used for `ObjectRecord::content_hash` so the two invariants share
//! one implementation.

use serde::Serialize;

use crm_core::{content_hash, ContentHash};

#[derive(Serialize)]
struct KeyInput<'a> {
    data_type: &'a str,
    object_ref: &'a str,
    parameters: &'a [(&'a str, &'a str)],
    schema_version: u32,
}

/// A cache key, derived deterministically from data type, ref, query
/// parameters, and schema version. Used as the on-disk filename
/// (hex-encoded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(ContentHash);

impl CacheKey {
    pub fn derive(
        data_type: &str,
        object_ref: &str,
        parameters: &[(&str, &str)],
        schema_version: u32,
    ) -> Self {
        let input = KeyInput {
            data_type,
            object_ref,
            parameters,
            schema_version,
        };
        CacheKey(content_hash(&input))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_key() {
        let a = CacheKey::derive("stats", "Account", &[("sample", "100")], 3);
        let b = CacheKey::derive("stats", "Account", &[("sample", "100")], 3);
        assert_eq!(a, b);
    }

    #[test]
    fn different_schema_version_changes_key() {
        let a = CacheKey::derive("stats", "Account", &[], 3);
        let b = CacheKey::derive("stats", "Account", &[], 4);
        assert_ne!(a, b);
    }

    #[test]
    fn different_object_ref_changes_key() {
        let a = CacheKey::derive("stats", "Account", &[], 3);
        let b = CacheKey::derive("stats", "Contact", &[], 3);
        assert_ne!(a, b);
    }

    #[test]
    fn key_renders_as_hex() {
        let key = CacheKey::derive("stats", "Account", &[], 3);
        assert_eq!(key.to_hex().len(), 64);
        assert_eq!(key.to_string(), key.to_hex());
    }
}
