//! Record storage collaborator used by the `read` and `expand` operators.
//!
//! The engine does not own a data layer. Operators reach records through the
//! `persistence` service, an `Arc<dyn Persistence>`, and remember what they
//! loaded during one invocation in the request-scoped `resources` service
//! ([`ResourceRegistry`]).

mod in_memory;
mod resources;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

pub use in_memory::InMemoryPersistence;
pub use resources::ResourceRegistry;

pub const PERSISTENCE_SERVICE: &str = "persistence";
pub const RESOURCES_SERVICE: &str = "resources";

#[mockall::automock]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// The record of `model` with identifier `id`, if any.
    async fn find_by_id(&self, model: &str, id: &str) -> EngineResult<Option<Value>>;

    /// Reference fields of `model`, mapped to the model they point at.
    fn references(&self, model: &str) -> HashMap<String, String>;
}

/// Record identifiers are strings or integers; both are looked up as text.
pub fn record_id(value: &Value) -> EngineResult<String> {
    match value {
        Value::String(id) => Ok(id.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(EngineError::validation(
            "persistence",
            format!("Record id must be a string or an integer, found {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_forms() {
        assert_eq!(record_id(&json!("7")).unwrap(), "7");
        assert_eq!(record_id(&json!(7)).unwrap(), "7");
        assert!(record_id(&json!(7.5)).is_err());
        assert!(record_id(&json!(null)).is_err());
    }
}
