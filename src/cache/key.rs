//! Deterministic cache key derivation
//!
//! Two logically identical calls must land on the same entry no matter how
//! the caller built its parameter object, so parameter maps are canonicalized
//! (keys sorted, recursively) before they are serialized.

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Recursively sort object keys
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, val) in pairs {
                out.insert(key.clone(), canonicalize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        _ => value.clone(),
    }
}

/// Serialize a parameter object into canonical JSON text
///
/// Fails with [`CacheError::InvalidParameters`] when the parameters are not a
/// JSON object or cannot be serialized at all (e.g. maps with non-string keys).
pub fn canonical_json<P: Serialize + ?Sized>(params: &P) -> Result<String> {
    let value = serde_json::to_value(params)
        .map_err(|e| CacheError::InvalidParameters(e.to_string()))?;

    match value {
        Value::Object(_) => serde_json::to_string(&canonicalize(&value))
            .map_err(|e| CacheError::InvalidParameters(e.to_string())),
        Value::Null => Ok("{}".to_string()),
        other => Err(CacheError::InvalidParameters(format!(
            "expected a parameter object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// `"<toolName>:<canonicalJSON>"`
pub fn derive_key<P: Serialize + ?Sized>(tool_name: &str, params: &P) -> Result<CacheKey> {
    if tool_name.is_empty() {
        return Err(CacheError::InvalidParameters(
            "tool name must not be empty".to_string(),
        ));
    }

    Ok(format!("{}:{}", tool_name, canonical_json(params)?))
}

/// Short non-cryptographic hash of the canonical parameters
///
/// Only used as a secondary index column; the full key stays authoritative.
pub fn hash_params<P: Serialize + ?Sized>(params: &P) -> Result<String> {
    Ok(rolling_hash(&canonical_json(params)?))
}

/// 32-bit `h * 31 + c` hash over UTF-16 code units, rendered in base 36
pub fn rolling_hash(text: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    to_base36(hash)
}

fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let negative = value < 0;
    let mut n = (value as i64).unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Tool name component of a derived key (text before the first `:`)
pub fn tool_name_of(key: &str) -> &str {
    key.split_once(':').map(|(tool, _)| tool).unwrap_or(key)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for colon-separated entity keys used by data-access services
///
/// ```
/// use tool_cache::cache::KeyBuilder;
///
/// let key = KeyBuilder::new("project").segment("p1").segment("stats").build();
/// assert_eq!(key, "project:p1:stats");
/// ```
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    segments: Vec<String>,
}

impl KeyBuilder {
    /// Start a key with its entity namespace (e.g. `"project"`, `"projects"`)
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            segments: vec![namespace.into()],
        }
    }

    /// Append a segment
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a segment, or `"all"` when absent
    pub fn segment_or_all(self, segment: Option<&str>) -> Self {
        self.segment(segment.unwrap_or("all"))
    }

    pub fn build(self) -> CacheKey {
        self.segments.join(":")
    }

    /// Pattern covering every key below this prefix, e.g. `"project:p1:*"`
    pub fn wildcard(self) -> String {
        format!("{}:*", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_key_is_independent_of_insertion_order() {
        let mut p1 = Map::new();
        p1.insert("a".to_string(), json!(1));
        p1.insert("b".to_string(), json!(2));

        let mut p2 = HashMap::new();
        p2.insert("b", json!(2));
        p2.insert("a", json!(1));

        assert_eq!(
            derive_key("get_projects", &p1).unwrap(),
            derive_key("get_projects", &p2).unwrap()
        );
        assert_eq!(derive_key("get_projects", &p1).unwrap(), r#"get_projects:{"a":1,"b":2}"#);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let value = json!({"z": {"y": 1, "x": [{"b": 1, "a": 2}]}, "a": null});
        let text = serde_json::to_string(&canonicalize(&value)).unwrap();
        assert_eq!(text, r#"{"a":null,"z":{"x":[{"a":2,"b":1}],"y":1}}"#);
    }

    #[test]
    fn test_hash_is_reproducible() {
        let h1 = hash_params(&json!({"projectId": "p1", "limit": 20})).unwrap();
        let h2 = hash_params(&json!({"limit": 20, "projectId": "p1"})).unwrap();
        assert_eq!(h1, h2);

        let h3 = hash_params(&json!({"projectId": "p2", "limit": 20})).unwrap();
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_rolling_hash_values() {
        assert_eq!(rolling_hash(""), "0");
        // "a" = 97 = 2 * 36 + 25
        assert_eq!(rolling_hash("a"), "2p");
        // "{}" = 123 * 31 + 125 = 3938
        assert_eq!(rolling_hash("{}"), "31e");
        // long inputs wrap into the negative i32 range
        assert!(rolling_hash(&"z".repeat(64)).len() <= 8);
    }

    #[test]
    fn test_non_object_params_are_rejected() {
        let err = derive_key("get_projects", &json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameters(_)));

        let err = derive_key("get_projects", &"plain").unwrap_err();
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn test_non_string_map_keys_are_rejected() {
        let mut params: HashMap<(u8, u8), u8> = HashMap::new();
        params.insert((1, 2), 3);
        let err = derive_key("get_projects", &params).unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameters(_)));
    }

    #[test]
    fn test_null_params_mean_no_params() {
        assert_eq!(derive_key("get_business_overview", &Value::Null).unwrap(), "get_business_overview:{}");
    }

    #[test]
    fn test_tool_name_of() {
        assert_eq!(tool_name_of(r#"get_projects:{"a":1}"#), "get_projects");
        assert_eq!(tool_name_of("plain"), "plain");
    }

    #[test]
    fn test_key_builder() {
        assert_eq!(KeyBuilder::new("projects").segment("list").segment_or_all(None).build(), "projects:list:all");
        assert_eq!(KeyBuilder::new("project").segment("p9").wildcard(), "project:p9:*");
    }
}
