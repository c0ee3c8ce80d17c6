//! Script definitions and the operand micro-syntax.
//!
//! A script is an ordered list of steps:
//!
//! ```json
//! [
//!   {"set": "post", "op": "read", "input": {"model": "Post", "id": "1"}},
//!   {"set": "visible", "op": "&&", "left": "/post/published", "right": "/post/approved"}
//! ]
//! ```
//!
//! Each operand is an [`Expression`]: a pointer string (`"/post/id"`), the
//! escape form (`{"=": "/not-a-pointer"}`), a nested step tree
//! (`{"op": "not", "input": "/flag"}`) or any other literal.

use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

use super::pointer;

pub const ESCAPE_KEY: &str = "=";

const STEP_KEYS: [&str; 5] = ["op", "set", "input", "left", "right"];

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Pointer(String),
    Escaped(Value),
    Step(Box<Step>),
}

impl From<&Value> for Expression {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) if pointer::is_pointer(s) => Expression::Pointer(s.clone()),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(escaped) = map.get(ESCAPE_KEY) {
                        return Expression::Escaped(escaped.clone());
                    }
                }
                if is_step_tree(map) {
                    return Expression::Step(Box::new(Step::from_map(map)));
                }
                Expression::Literal(value.clone())
            }
            _ => Expression::Literal(value.clone()),
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::from(&value)
    }
}

impl Expression {
    pub fn is_step(&self) -> bool {
        matches!(self, Expression::Step(_))
    }

    /// Member of a literal object, parsed as an expression in its own right.
    pub fn member(&self, key: &str) -> Option<Expression> {
        match self {
            Expression::Literal(Value::Object(map)) => map.get(key).map(Expression::from),
            _ => None,
        }
    }
}

fn is_step_tree(map: &Map<String, Value>) -> bool {
    matches!(map.get("op"), Some(Value::String(_)))
        && map.keys().all(|k| STEP_KEYS.contains(&k.as_str()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Variable the result is bound to. `None` is a pass-through step.
    pub target: Option<String>,
    pub operator: String,
    pub input: Option<Expression>,
    pub left: Option<Expression>,
    pub right: Option<Expression>,
}

impl Step {
    pub fn new(operator: &str) -> Self {
        Self {
            target: None,
            operator: operator.to_string(),
            input: None,
            left: None,
            right: None,
        }
    }

    pub fn set(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn input(mut self, value: Value) -> Self {
        self.input = Some(Expression::from(value));
        self
    }

    pub fn left(mut self, value: Value) -> Self {
        self.left = Some(Expression::from(value));
        self
    }

    pub fn right(mut self, value: Value) -> Self {
        self.right = Some(Expression::from(value));
        self
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            target: map.get("set").and_then(Value::as_str).map(str::to_string),
            operator: map
                .get("op")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input: map.get("input").map(Expression::from),
            left: map.get("left").map(Expression::from),
            right: map.get("right").map(Expression::from),
        }
    }

    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| EngineError::validation("script", "Step must be an object"))?;
        match map.get("op") {
            Some(Value::String(_)) => {}
            _ => {
                return Err(EngineError::validation(
                    "script",
                    "Step requires a string 'op' member",
                ));
            }
        }
        if let Some(unknown) = map.keys().find(|k| !STEP_KEYS.contains(&k.as_str())) {
            return Err(EngineError::validation(
                "script",
                format!("Unknown step member: {}", unknown),
            ));
        }
        if let Some(target) = map.get("set") {
            if !target.is_string() {
                return Err(EngineError::validation(
                    "script",
                    "Step target 'set' must be a string",
                ));
            }
        }
        Ok(Self::from_map(map))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Accepts either a bare array of steps or `{"steps": [...]}`.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let steps = match value {
            Value::Array(steps) => steps,
            Value::Object(map) => map
                .get("steps")
                .and_then(Value::as_array)
                .ok_or_else(|| EngineError::validation("script", "Missing 'steps' array"))?,
            _ => {
                return Err(EngineError::validation(
                    "script",
                    "Script must be an array or an object",
                ));
            }
        };
        let steps = steps
            .iter()
            .map(Step::from_value)
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { steps })
    }

    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| EngineError::validation("script", e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_forms() {
        assert_eq!(
            Expression::from(json!("/a")),
            Expression::Pointer("/a".to_string())
        );
        assert_eq!(
            Expression::from(json!({"=": "/a"})),
            Expression::Escaped(json!("/a"))
        );
        assert_eq!(
            Expression::from(json!("plain")),
            Expression::Literal(json!("plain"))
        );
        assert!(Expression::from(json!({"op": "not", "input": true})).is_step());
    }

    #[test]
    fn test_escape_needs_exactly_one_key() {
        let expr = Expression::from(json!({"=": 1, "other": 2}));
        assert_eq!(expr, Expression::Literal(json!({"=": 1, "other": 2})));
    }

    #[test]
    fn test_object_with_foreign_keys_is_literal() {
        let expr = Expression::from(json!({"op": "not", "note": "hi"}));
        assert_eq!(expr, Expression::Literal(json!({"op": "not", "note": "hi"})));

        let expr = Expression::from(json!({"op": 3}));
        assert!(!expr.is_step());
    }

    #[test]
    fn test_nested_steps_parse_recursively() {
        let expr = Expression::from(json!({
            "op": "and",
            "left": "/a",
            "right": {"op": "not", "input": "/b"}
        }));
        let Expression::Step(step) = expr else {
            panic!("expected a step");
        };
        assert_eq!(step.operator, "and");
        assert_eq!(step.left, Some(Expression::Pointer("/a".to_string())));
        assert!(step.right.as_ref().unwrap().is_step());
    }

    #[test]
    fn test_script_shapes() {
        let steps = json!([{"op": "now", "set": "t"}]);
        assert_eq!(Script::from_value(&steps).unwrap().len(), 1);

        let wrapped = json!({"steps": [{"op": "now"}, {"op": "now"}]});
        assert_eq!(Script::from_value(&wrapped).unwrap().len(), 2);

        assert!(Script::from_value(&json!("nope")).is_err());
        assert!(Script::from_value(&json!([{"set": "x"}])).is_err());
        assert!(Script::from_value(&json!([{"op": "now", "extra": 1}])).is_err());
    }

    #[test]
    fn test_member_of_literal_object() {
        let expr = Expression::from(json!({"test": "/flag", "then": 1}));
        assert_eq!(
            expr.member("test"),
            Some(Expression::Pointer("/flag".to_string()))
        );
        assert_eq!(expr.member("else"), None);
    }
}
