//! Argument checking against a command's parameter schema.
//!
//! Supports the JSON Schema subset commands actually declare: a top-level
//! `object` with `properties`, `required` and `additionalProperties: false`,
//! where each property has a primitive `type`.

use serde_json::Value;

/// Check `args` against `schema`. Returns a human-readable reason on failure.
pub fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(kind) = schema.get("type").and_then(Value::as_str) {
        if !matches_type(kind, args) {
            return Err(format!("expected {}, got {}", kind, type_name(args)));
        }
    }

    let Some(object) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (key, value) in object {
        match properties.and_then(|p| p.get(key)) {
            Some(property) => {
                if let Some(kind) = property.get("type").and_then(Value::as_str) {
                    if !matches_type(kind, value) {
                        return Err(format!(
                            "argument '{}' must be {}, got {}",
                            key,
                            kind,
                            type_name(value)
                        ));
                    }
                }
            }
            None if closed => return Err(format!("unexpected argument '{}'", key)),
            None => {}
        }
    }

    Ok(())
}

fn matches_type(kind: &str, value: &Value) -> bool {
    match kind {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render `name key=<type> [optional=<type>]` from a schema.
///
/// Required arguments come first, each group in property-name order.
pub fn usage(name: &str, schema: &Value) -> String {
    let properties = schema.get("properties").and_then(Value::as_object);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut keys: Vec<(&String, &Value)> = properties.map(|p| p.iter().collect()).unwrap_or_default();
    keys.sort_by(|a, b| a.0.cmp(b.0));

    let mut parts = vec![name.to_string()];
    for (key, property) in keys.iter().filter(|(k, _)| required.contains(&k.as_str())) {
        parts.push(format!("{}=<{}>", key, property_type(property)));
    }
    for (key, property) in keys.iter().filter(|(k, _)| !required.contains(&k.as_str())) {
        parts.push(format!("[{}=<{}>]", key, property_type(property)));
    }
    parts.join(" ")
}

fn property_type(property: &Value) -> &str {
    property.get("type").and_then(Value::as_str).unwrap_or("value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "depth": { "type": "integer" },
                "ratio": { "type": "number" },
                "force": { "type": "boolean" }
            },
            "required": ["path"]
        })
    }

    #[test]
    fn test_accepts_valid_arguments() {
        assert!(validate(&schema(), &json!({"path": "/tmp", "depth": 2, "ratio": 0.5})).is_ok());
        assert!(validate(&schema(), &json!({"path": "/tmp", "extra": 1})).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&schema(), &json!({"depth": 1})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn test_wrong_property_type() {
        let err = validate(&schema(), &json!({"path": "/", "depth": "deep"})).unwrap_err();
        assert!(err.contains("depth"));
        assert!(err.contains("integer"));

        // Integers are valid numbers but floats are not integers.
        assert!(validate(&schema(), &json!({"path": "/", "ratio": 3})).is_ok());
        assert!(validate(&schema(), &json!({"path": "/", "depth": 1.5})).is_err());
    }

    #[test]
    fn test_closed_object() {
        let closed = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "additionalProperties": false
        });
        let err = validate(&closed, &json!({"b": 1})).unwrap_err();
        assert!(err.contains("unexpected argument 'b'"));
    }

    #[test]
    fn test_non_object_arguments() {
        assert!(validate(&schema(), &json!([1, 2])).is_err());
        assert!(validate(&Value::Null, &json!("anything")).is_ok());
    }

    #[test]
    fn test_usage_orders_required_first() {
        assert_eq!(
            usage("scan", &schema()),
            "scan path=<string> [depth=<integer>] [force=<boolean>] [ratio=<number>]"
        );
        assert_eq!(usage("bare", &json!({"type": "object"})), "bare");
    }
}
