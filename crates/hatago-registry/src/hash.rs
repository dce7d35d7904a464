//! The toolset hash: a deterministic digest of the currently reachable
//! tool set, used so clients can cheaply detect "nothing changed" across
//! a reconnect.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as JSON with object keys sorted, recursively. This is
/// `serde_json`'s natural output plus a key sort, not a general JSON
/// canonicalization (numbers are serialized as serde_json already would).
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("canonical value always serializes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), sort_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over `publicName \0 canonicalJson(inputSchema) \x01` for each
/// `(publicName, schema)` pair in lexicographic order of `publicName`.
/// Returns `(full_hex, truncated_16_hex)`.
pub fn toolset_hash<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>) -> (String, String) {
    let mut sorted: Vec<(&str, &Value)> = entries.collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, schema) in sorted {
        hasher.update(name.as_bytes());
        hasher.update([0x00]);
        hasher.update(canonical_json(schema).as_bytes());
        hasher.update([0x01]);
    }
    let full = format!("{:x}", hasher.finalize());
    let truncated = full[..16].to_string();
    (full, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_order_independent_across_input_iteration_order() {
        let a = [
            ("zzz", json!({"type": "object"})),
            ("aaa", json!({"type": "string"})),
        ];
        let b = [
            ("aaa", json!({"type": "string"})),
            ("zzz", json!({"type": "object"})),
        ];
        let (full_a, _) = toolset_hash(a.iter().map(|(n, s)| (*n, s)));
        let (full_b, _) = toolset_hash(b.iter().map(|(n, s)| (*n, s)));
        assert_eq!(full_a, full_b);
    }

    #[test]
    fn hash_changes_when_schema_changes() {
        let before = [("echo", json!({"type": "object"}))];
        let after = [("echo", json!({"type": "string"}))];
        let (h1, _) = toolset_hash(before.iter().map(|(n, s)| (*n, s)));
        let (h2, _) = toolset_hash(after.iter().map(|(n, s)| (*n, s)));
        assert_ne!(h1, h2);
    }

    #[test]
    fn canonical_json_sorts_object_keys() {
        let value = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json(&value), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn truncated_hash_is_16_hex_chars() {
        let (_, truncated) = toolset_hash([("echo", &json!({}))].into_iter());
        assert_eq!(truncated.len(), 16);
    }
}
