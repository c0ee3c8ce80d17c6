use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Records loaded during one invocation, keyed by model and id.
///
/// Registered as a request-scoped service, so each invocation starts empty
/// and repeated references to the same record hit the registry instead of
/// the persistence layer.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    records: Arc<DashMap<(String, String), Value>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &str, id: &str) -> Option<Value> {
        self.records
            .get(&(model.to_string(), id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, model: &str, id: &str, record: Value) {
        self.records
            .insert((model.to_string(), id.to_string()), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
