//! Deterministic JSON serialization for signing.
//!
//! Signatures must be reproducible by the verifier, so payloads are
//! serialized with object keys in lexicographic order, no
//! insignificant whitespace, and only the fields the signature
//! declares. The phase discriminator of a handshake message is always
//! part of the signed set, which prevents a signature minted for one
//! phase from being replayed on another.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CryptoError, CryptoResult};

/// Serialize a value to canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CryptoError::SerializationFailed`] if the value cannot
/// be represented as JSON.
pub fn to_canonical_json<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let value =
        serde_json::to_value(value).map_err(|e| CryptoError::SerializationFailed(e.to_string()))?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out.into_bytes())
}

/// Extract the named fields from a JSON object and serialize the
/// subset canonically.
///
/// The subset is rebuilt as an object holding exactly the named
/// fields, so verification is independent of any extra fields the
/// sender attached.
///
/// # Errors
///
/// Returns [`CryptoError::MissingSignedField`] if a named field is
/// absent, or [`CryptoError::SerializationFailed`] if the payload is
/// not a JSON object.
pub fn canonical_subset(payload: &Value, fields: &[String]) -> CryptoResult<Vec<u8>> {
    let Some(object) = payload.as_object() else {
        return Err(CryptoError::SerializationFailed(
            "signed payload must be a JSON object".to_string(),
        ));
    };

    let mut subset = serde_json::Map::new();
    for field in fields {
        let Some(value) = object.get(field) else {
            return Err(CryptoError::MissingSignedField(field.clone()));
        };
        subset.insert(field.clone(), value.clone());
    }

    let mut out = String::new();
    write_canonical(&Value::Object(subset), &mut out);
    Ok(out.into_bytes())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json's string encoder handles escaping.
            if let Ok(encoded) = serde_json::to_string(s) {
                out.push_str(&encoded);
            }
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if let Ok(encoded) = serde_json::to_string(key) {
                    out.push_str(&encoded);
                }
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let bytes = to_canonical_json(&json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#
        );
    }

    #[test]
    fn test_arrays_preserve_order() {
        let bytes = to_canonical_json(&json!({"items": [3, 1, 2]})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"items":[3,1,2]}"#);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let value = json!({"nonce": "abc", "kind": "handshake_request", "seq": 9});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            to_canonical_json(&value).unwrap()
        );
    }

    #[test]
    fn test_subset_drops_unsigned_extras() {
        let payload = json!({
            "kind": "handshake_response",
            "sessionId": "s1",
            "timestamp": "2026-01-01T00:00:00Z",
            "debugNote": "not signed"
        });
        let fields = vec!["kind".to_string(), "sessionId".to_string()];

        let bytes = canonical_subset(&payload, &fields).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"kind":"handshake_response","sessionId":"s1"}"#
        );
    }

    #[test]
    fn test_subset_rejects_missing_field() {
        let payload = json!({"kind": "handshake_request"});
        let fields = vec!["kind".to_string(), "nonce".to_string()];
        assert!(matches!(
            canonical_subset(&payload, &fields),
            Err(CryptoError::MissingSignedField(f)) if f == "nonce"
        ));
    }

    #[test]
    fn test_string_escaping() {
        let bytes = to_canonical_json(&json!({"text": "line\nbreak \"quoted\""})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"text":"line\nbreak \"quoted\""}"#
        );
    }
}
