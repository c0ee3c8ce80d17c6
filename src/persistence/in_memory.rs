//! Fixture-backed persistence for the command line runner and tests.
//!
//! Fixtures are JSON:
//!
//! ```json
//! {
//!   "Post": {
//!     "references": {"author": "User"},
//!     "records": [{"id": "1", "title": "Hello", "author": "2"}]
//!   },
//!   "User": {"records": [{"id": "2", "name": "John"}]}
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config;
use crate::error::{EngineError, EngineResult, InternalResult};

use super::{Persistence, record_id};

#[derive(Debug, Default, Deserialize)]
struct ModelFixture {
    #[serde(default)]
    references: HashMap<String, String>,
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Debug, Default)]
struct ModelStore {
    references: HashMap<String, String>,
    records: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    models: Arc<DashMap<String, ModelStore>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixtures(fixtures: Value) -> EngineResult<Self> {
        let fixtures: HashMap<String, ModelFixture> = serde_json::from_value(fixtures)
            .map_err(|e| EngineError::validation("fixtures", e.to_string()))?;

        let persistence = Self::new();
        for (model, fixture) in fixtures {
            persistence.define_model(&model, fixture.references);
            for record in fixture.records {
                persistence.insert(&model, record)?;
            }
        }
        Ok(persistence)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        let fixtures: Value = config::from_file(path)?;
        Ok(Self::from_fixtures(fixtures)?)
    }

    /// Declares `model` with its reference fields, replacing earlier ones.
    pub fn define_model(&self, model: &str, references: HashMap<String, String>) {
        self.models.entry(model.to_string()).or_default().references = references;
    }

    /// Stores `record` under its `id` member.
    #[instrument(level = "debug", skip(self, record))]
    pub fn insert(&self, model: &str, record: Value) -> EngineResult<()> {
        let id = record
            .get("id")
            .ok_or_else(|| EngineError::validation("fixtures", "Record has no 'id' member"))
            .and_then(record_id)?;
        debug!(%id, "record stored");
        self.models
            .entry(model.to_string())
            .or_default()
            .records
            .insert(id, record);
        Ok(())
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn find_by_id(&self, model: &str, id: &str) -> EngineResult<Option<Value>> {
        let store = self
            .models
            .get(model)
            .ok_or_else(|| EngineError::not_found("model", model))?;
        Ok(store.records.get(id).cloned())
    }

    fn references(&self, model: &str) -> HashMap<String, String> {
        self.models
            .get(model)
            .map(|store| store.references.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixtures() -> Value {
        json!({
            "Post": {
                "references": {"author": "User"},
                "records": [{"id": "1", "title": "Hello", "author": "2"}]
            },
            "User": {"records": [{"id": 2, "name": "John"}]}
        })
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let persistence = InMemoryPersistence::from_fixtures(fixtures()).unwrap();

        let post = persistence.find_by_id("Post", "1").await.unwrap();
        assert_eq!(post.unwrap()["title"], "Hello");
        // integer ids are looked up as text
        assert!(persistence.find_by_id("User", "2").await.unwrap().is_some());
        assert_eq!(persistence.find_by_id("Post", "9").await.unwrap(), None);
        assert!(matches!(
            persistence.find_by_id("Comment", "1").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_references() {
        let persistence = InMemoryPersistence::from_fixtures(fixtures()).unwrap();
        assert_eq!(
            persistence.references("Post").get("author").map(String::as_str),
            Some("User")
        );
        assert!(persistence.references("User").is_empty());
    }

    #[test]
    fn test_records_need_an_id() {
        let result = InMemoryPersistence::from_fixtures(json!({
            "Post": {"records": [{"title": "anonymous"}]}
        }));
        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", fixtures()).unwrap();

        let persistence = InMemoryPersistence::from_file(file.path()).unwrap();
        assert!(persistence.find_by_id("Post", "1").await.unwrap().is_some());
    }
}
