//! Canonical JSON serialization for model bundle hashing
//!
//! Object keys are sorted recursively and no whitespace is emitted, so the
//! same bundle always hashes to the same blake3 digest.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json_value = serde_json::to_value(value)
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))?;

    let canonical = canonicalize_value(&json_value);
    serde_json::to_string(&canonical)
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<_, _> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_value(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// Blake3 hash of the canonical JSON form, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        b_field: f64,
        a_field: i64,
        nested: BTreeMap<String, i64>,
    }

    fn sample(b: f64) -> Sample {
        Sample {
            b_field: b,
            a_field: 1,
            nested: BTreeMap::from([("z".to_string(), 2), ("c".to_string(), 3)]),
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let json = to_canonical_json(&sample(0.5)).unwrap();
        assert_eq!(json, r#"{"a_field":1,"b_field":0.5,"nested":{"c":3,"z":2}}"#);
    }

    #[test]
    fn test_hash_tracks_content() {
        let h1 = hash_canonical_hex(&sample(0.5)).unwrap();
        let h2 = hash_canonical_hex(&sample(0.5)).unwrap();
        let h3 = hash_canonical_hex(&sample(0.25)).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }
}
