//! Operand schema validation.
//!
//! The evaluator only needs a yes/no answer with a readable reason, so the
//! validator is a trait. [`BasicSchemaValidator`] understands a small JSON
//! Schema subset: `type`, `required`, `properties`, `items`, `enum` and
//! `pattern`. Unknown keywords are ignored. Nothing is coerced.

use regex::Regex;
use serde_json::Value;

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Value, value: &Value) -> Result<(), String>;
}

#[derive(Debug, Default, Clone)]
pub struct BasicSchemaValidator;

impl BasicSchemaValidator {
    pub fn new() -> Self {
        Self
    }

    fn check(&self, schema: &Value, value: &Value, path: &str) -> Result<(), String> {
        let schema = match schema {
            Value::Bool(true) | Value::Null => return Ok(()),
            Value::Bool(false) => return Err(format!("{}: no value is allowed", at(path))),
            Value::Object(schema) => schema,
            _ => return Err(format!("{}: schema must be an object", at(path))),
        };

        if let Some(expected) = schema.get("type") {
            let allowed: Vec<&str> = match expected {
                Value::String(t) => vec![t.as_str()],
                Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
                _ => return Err(format!("{}: 'type' must be a string or array", at(path))),
            };
            if !allowed.iter().any(|t| type_matches(t, value)) {
                return Err(format!(
                    "{}: expected {}, found {}",
                    at(path),
                    allowed.join(" or "),
                    type_name(value)
                ));
            }
        }

        if let Some(Value::Array(options)) = schema.get("enum") {
            if !options.contains(value) {
                return Err(format!("{}: value is not one of the allowed options", at(path)));
            }
        }

        if let (Some(Value::String(pattern)), Value::String(s)) = (schema.get("pattern"), value) {
            let re = Regex::new(pattern)
                .map_err(|e| format!("{}: invalid pattern {}: {}", at(path), pattern, e))?;
            if !re.is_match(s) {
                return Err(format!("{}: '{}' does not match {}", at(path), s, pattern));
            }
        }

        if let Value::Object(map) = value {
            if let Some(Value::Array(required)) = schema.get("required") {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        return Err(format!("{}: missing required member '{}'", at(path), key));
                    }
                }
            }
            if let Some(Value::Object(properties)) = schema.get("properties") {
                for (key, sub_schema) in properties {
                    if let Some(member) = map.get(key) {
                        self.check(sub_schema, member, &format!("{}/{}", path, key))?;
                    }
                }
            }
        }

        if let (Some(item_schema), Value::Array(items)) = (schema.get("items"), value) {
            for (i, item) in items.iter().enumerate() {
                self.check(item_schema, item, &format!("{}/{}", path, i))?;
            }
        }

        Ok(())
    }
}

impl SchemaValidator for BasicSchemaValidator {
    fn validate(&self, schema: &Value, value: &Value) -> Result<(), String> {
        self.check(schema, value, "")
    }
}

fn at(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "any" => true,
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
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
