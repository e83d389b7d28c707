//! Schema validator for tool input/output.
//!
//! A small JSON-Schema subset implemented directly, so the mandatory depth
//! limit — absent from the draft-7/2020-12 standard itself — is enforced
//! as a first-class parameter rather than bolted on afterward.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Recursion depth beyond which a schema is refused rather than walked,
/// to prevent infinite recursion on cyclic schemas.
pub const MAX_SCHEMA_DEPTH: usize = 16;

pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<SchemaError>> {
    let mut errors = Vec::new();
    walk(schema, value, "$", 0, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn walk(schema: &Value, value: &Value, path: &str, depth: usize, errors: &mut Vec<SchemaError>) {
    if depth > MAX_SCHEMA_DEPTH {
        errors.push(SchemaError {
            path: path.to_string(),
            message: format!("schema recursion exceeded depth limit of {MAX_SCHEMA_DEPTH}"),
        });
        return;
    }

    let Some(obj) = schema.as_object() else {
        return;
    };

    if let Some(ty) = obj.get("type").and_then(Value::as_str) {
        if !type_matches(ty, value) {
            errors.push(SchemaError {
                path: path.to_string(),
                message: format!("expected type {ty}, found {}", type_name(value)),
            });
            return;
        }
    }

    if let Some(allowed) = obj.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(SchemaError {
                path: path.to_string(),
                message: "value not in enum".to_string(),
            });
        }
    }

    if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
        if let Some(s) = value.as_str() {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => errors.push(SchemaError {
                    path: path.to_string(),
                    message: format!("does not match pattern {pattern}"),
                }),
                Err(e) => errors.push(SchemaError {
                    path: path.to_string(),
                    message: format!("invalid pattern {pattern}: {e}"),
                }),
                _ => {}
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = obj.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(SchemaError {
                    path: path.to_string(),
                    message: format!("{n} below minimum {min}"),
                });
            }
        }
        if let Some(max) = obj.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(SchemaError {
                    path: path.to_string(),
                    message: format!("{n} above maximum {max}"),
                });
            }
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(required) = obj.get("required").and_then(Value::as_array) {
                for req in required {
                    if let Some(name) = req.as_str() {
                        if !map.contains_key(name) {
                            errors.push(SchemaError {
                                path: format!("{path}.{name}"),
                                message: "missing required property".to_string(),
                            });
                        }
                    }
                }
            }

            let properties = obj.get("properties").and_then(Value::as_object);
            if let Some(props) = properties {
                for (key, sub_schema) in props {
                    if let Some(sub_value) = map.get(key) {
                        walk(sub_schema, sub_value, &format!("{path}.{key}"), depth + 1, errors);
                    }
                }
            }

            if obj.get("additionalProperties") == Some(&Value::Bool(false)) {
                let allowed: std::collections::HashSet<&str> =
                    properties.map(|p| p.keys().map(String::as_str).collect()).unwrap_or_default();
                for key in map.keys() {
                    if !allowed.contains(key.as_str()) {
                        errors.push(SchemaError {
                            path: format!("{path}.{key}"),
                            message: "additional property not allowed".to_string(),
                        });
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = obj.get("items") {
                for (i, item) in items.iter().enumerate() {
                    walk(item_schema, item, &format!("{path}[{i}]"), depth + 1, errors);
                }
            }
        }
        _ => {}
    }
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        "any" => true,
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
