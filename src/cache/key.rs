//! Deterministic cache key derivation.
//!
//! `cache:<namespace>:<digest>` where the digest is the first 32 hex
//! characters of SHA-256 over the canonical JSON of the arguments. Object
//! keys are sorted recursively, arrays keep their order, so structurally
//! equal arguments always map to the same key.

use super::errors::{CacheError, CacheResult};
use crate::constants::{CACHE_DIGEST_HEX_LEN, CACHE_KEY_PREFIX};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Derive the cache key for `args` in `namespace`
pub fn derive_key(namespace: &str, args: &Value) -> String {
    let canonical = canonical_json(args);
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!(
        "{}:{}:{}",
        CACHE_KEY_PREFIX,
        namespace,
        &digest[..CACHE_DIGEST_HEX_LEN]
    )
}

/// Derive the cache key for any serializable argument struct
pub fn derive_key_for<T: Serialize + ?Sized>(namespace: &str, args: &T) -> CacheResult<String> {
    let value = serde_json::to_value(args)
        .map_err(|e| CacheError::SerializationError(format!("cache key arguments: {e}")))?;
    Ok(derive_key(namespace, &value))
}

/// Glob matching every key of a namespace
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:{}:*", CACHE_KEY_PREFIX, namespace)
}

/// Canonical JSON text: object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), canonicalize(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
