//! Result sanitizer applied before payloads cross the worker boundary.
//!
//! The dissection engine marks its native container values in JSON responses
//! as single-key objects `{"$vector": [...]}`. Hosts expect plain arrays, so
//! [`sanitize`] rewrites every such tagged object into the array it wraps,
//! recursively, and leaves everything else untouched.

use serde_json::Value;

/// Tag under which the engine wraps its native container values.
pub const VECTOR_TAG: &str = "$vector";

/// Recursively replace every `{"$vector": [...]}` object with the plain array
/// of its elements. Scalars, plain arrays, and plain objects pass through
/// unchanged; an object is only treated as a container when `$vector` is its
/// sole key and the value is an array.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::Array(items)) = map.get(VECTOR_TAG) {
                    return Value::Array(items.clone().into_iter().map(sanitize).collect());
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, inner)| (key, sanitize(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_unchanged() {
        assert_eq!(sanitize(json!(null)), json!(null));
        assert_eq!(sanitize(json!(42)), json!(42));
        assert_eq!(sanitize(json!("tcp.port == 443")), json!("tcp.port == 443"));
    }

    #[test]
    fn test_top_level_vector_flattened() {
        let input = json!({"$vector": [1, 2, 3]});
        assert_eq!(sanitize(input), json!([1, 2, 3]));
    }

    #[test]
    fn test_nested_vectors_flattened() {
        let input = json!({
            "frame": {
                "columns": {"$vector": ["No.", "Time", "Source"]},
                "tree": {"$vector": [
                    {"label": "Ethernet II", "fields": {"$vector": [1, 2]}},
                ]},
            }
        });
        let expected = json!({
            "frame": {
                "columns": ["No.", "Time", "Source"],
                "tree": [
                    {"label": "Ethernet II", "fields": [1, 2]},
                ],
            }
        });
        assert_eq!(sanitize(input), expected);
    }

    #[test]
    fn test_vector_key_among_others_is_not_a_container() {
        // Only single-key objects are containers; this is host data that
        // happens to contain the tag name.
        let input = json!({"$vector": [1], "note": "keep me"});
        assert_eq!(sanitize(input.clone()), input);
    }

    #[test]
    fn test_vector_tag_with_non_array_passes_through() {
        let input = json!({"$vector": "not an array"});
        assert_eq!(sanitize(input.clone()), input);
    }

    #[test]
    fn test_vectors_inside_plain_arrays() {
        let input = json!([{"$vector": ["a"]}, "b"]);
        assert_eq!(sanitize(input), json!([["a"], "b"]));
    }
}
