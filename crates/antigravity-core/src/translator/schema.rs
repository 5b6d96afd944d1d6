//! JSON-schema sanitisation for tool declarations sent upstream.

use serde_json::Value;

/// Keywords the upstream schema validator does not understand. Stripped
/// recursively from every object in the schema tree.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "additionalProperties",
    "examples",
    "default",
    "title",
    "const",
    "exclusiveMinimum",
    "exclusiveMaximum",
];

/// Rewrite a tool's `input_schema` into the upstream's accepted subset:
/// strip unsupported keywords and normalise `type` arrays (e.g.
/// `["string", "null"]`) down to their primary, non-null type.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut cleaned = serde_json::Map::new();
            for (key, value) in map {
                if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                if key == "type" {
                    cleaned.insert(key.clone(), normalize_type(value));
                    continue;
                }
                cleaned.insert(key.clone(), sanitize_schema(value));
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

fn normalize_type(value: &Value) -> Value {
    match value {
        Value::Array(types) => types
            .iter()
            .find(|t| t.as_str() != Some("null"))
            .cloned()
            .unwrap_or_else(|| Value::String("string".to_string())),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_unsupported_keywords_at_every_level() {
        let schema = json!({
            "type": "object",
            "$schema": "http://json-schema.org/draft-07/schema#",
            "properties": {
                "name": { "type": "string", "default": "x", "additionalProperties": false }
            }
        });
        let cleaned = sanitize_schema(&schema);
        assert!(cleaned.get("$schema").is_none());
        assert!(cleaned["properties"]["name"].get("default").is_none());
        assert!(cleaned["properties"]["name"].get("additionalProperties").is_none());
    }

    #[test]
    fn normalizes_type_arrays_to_primary_non_null_type() {
        let schema = json!({ "type": ["string", "null"] });
        let cleaned = sanitize_schema(&schema);
        assert_eq!(cleaned["type"], json!("string"));
    }
}
