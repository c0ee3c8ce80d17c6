use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::pointer;

/// Immutable snapshot of an invocation's variables.
///
/// Every step produces a new `Context`; the previous snapshot stays valid for
/// anyone still holding it (thunks created by earlier steps, for instance).
/// Pointers resolve against `current_data`, which is the object of all bound
/// variables unless a pass-through step or an iteration moved the cursor.
#[derive(Debug, Clone)]
pub struct Context {
    variables: Arc<Map<String, Value>>,
    current_data: Arc<Value>,
    correlation_id: Uuid,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl Context {
    /// Starts an invocation. Object input seeds the variables as well as the
    /// cursor.
    pub fn new(data: Value) -> Self {
        let variables = match &data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        Self {
            variables: Arc::new(variables),
            current_data: Arc::new(data),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// New snapshot with `name` bound to `value`; the cursor becomes the
    /// object of all variables.
    pub fn bind(&self, name: &str, value: Value) -> Self {
        let mut variables = (*self.variables).clone();
        variables.insert(name.to_string(), value);
        let current_data = Value::Object(variables.clone());
        Self {
            variables: Arc::new(variables),
            current_data: Arc::new(current_data),
            correlation_id: self.correlation_id,
        }
    }

    /// New snapshot with the cursor moved to `data`. Variables are kept.
    pub fn with_data(&self, data: Value) -> Self {
        Self {
            variables: self.variables.clone(),
            current_data: Arc::new(data),
            correlation_id: self.correlation_id,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn current_data(&self) -> &Value {
        &self.current_data
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn lookup(&self, path: &str) -> Value {
        pointer::lookup(&self.current_data, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_returns_new_snapshot() {
        let base = Context::new(json!({"a": 1}));
        let next = base.bind("b", json!(2));

        assert_eq!(base.variable("b"), None);
        assert_eq!(base.current_data(), &json!({"a": 1}));
        assert_eq!(next.variable("b"), Some(&json!(2)));
        assert_eq!(next.current_data(), &json!({"a": 1, "b": 2}));
        assert_eq!(base.correlation_id(), next.correlation_id());
    }

    #[test]
    fn test_with_data_moves_cursor_only() {
        let base = Context::new(json!({"a": 1}));
        let moved = base.with_data(json!([1, 2, 3]));

        assert_eq!(moved.lookup("/1"), json!(2));
        assert_eq!(moved.variable("a"), Some(&json!(1)));
    }

    #[test]
    fn test_bind_after_pass_through_restores_variable_root() {
        let ctx = Context::new(json!({"a": 1}))
            .with_data(json!("elsewhere"))
            .bind("b", json!(true));
        assert_eq!(ctx.lookup("/a"), json!(1));
        assert_eq!(ctx.lookup("/b"), json!(true));
    }

    #[test]
    fn test_non_object_input_keeps_cursor() {
        let ctx = Context::new(json!([1, 2]));
        assert!(ctx.variables().is_empty());
        assert_eq!(ctx.lookup("/"), json!([1, 2]));
    }
}
