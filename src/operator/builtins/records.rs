//! Record reads and reference expansion.
//!
//! A selection set is an object whose keys are field names and whose values
//! are nested selection sets: `{"title": {}, "author": {"name": {}}}`. An
//! empty selection set selects the whole record.

use std::sync::Arc;

use async_recursion::async_recursion;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};
use crate::operator::operator::{Operator, OperatorCall, OperatorOutput};
use crate::persistence::{
    PERSISTENCE_SERVICE, Persistence, RESOURCES_SERVICE, ResourceRegistry, record_id,
};

/// Keeps the top-level fields named in `selections`. Arrays are projected
/// element-wise; anything else passes through.
pub fn project(value: &Value, selections: &Value) -> Value {
    let fields = match selections.as_object() {
        Some(fields) if !fields.is_empty() => fields,
        _ => return value.clone(),
    };
    match value {
        Value::Object(record) => Value::Object(
            fields
                .keys()
                .map(|field| {
                    let member = record.get(field).cloned().unwrap_or(Value::Null);
                    (field.clone(), member)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| project(item, selections)).collect())
        }
        other => other.clone(),
    }
}

struct Records {
    persistence: Arc<dyn Persistence>,
    resources: ResourceRegistry,
}

impl Records {
    fn from_call(call: &OperatorCall<'_>) -> EngineResult<Self> {
        Ok(Self {
            persistence: call.deps.get::<Arc<dyn Persistence>>(PERSISTENCE_SERVICE)?,
            resources: call.deps.get::<ResourceRegistry>(RESOURCES_SERVICE)?,
        })
    }

    /// Loads a record, serving repeats within the request from `resources`.
    async fn load(&self, model: &str, id: &str) -> EngineResult<Option<Value>> {
        if let Some(record) = self.resources.get(model, id) {
            trace!(model, id, "record served from request resources");
            return Ok(Some(record));
        }
        let record = self.persistence.find_by_id(model, id).await?;
        if let Some(record) = &record {
            self.resources.insert(model, id, record.clone());
        }
        Ok(record)
    }

    #[async_recursion]
    async fn expand(
        &self,
        value: Value,
        model: &str,
        selections: &Map<String, Value>,
    ) -> EngineResult<Value> {
        let mut record = match value {
            Value::Array(items) => {
                let mut expanded = Vec::with_capacity(items.len());
                for item in items {
                    expanded.push(self.expand(item, model, selections).await?);
                }
                return Ok(Value::Array(expanded));
            }
            Value::Object(record) => record,
            other => return Ok(other),
        };

        let references = self.persistence.references(model);
        for (field, nested) in selections {
            let nested = match nested.as_object() {
                Some(nested) if !nested.is_empty() => nested,
                _ => continue,
            };
            let current = record.remove(field).unwrap_or(Value::Null);
            let resolved = match references.get(field) {
                Some(target) => self.follow(current, target, nested).await?,
                None => project(&current, &Value::Object(nested.clone())),
            };
            record.insert(field.clone(), resolved);
        }

        let selections = Value::Object(selections.clone());
        Ok(project(&Value::Object(record), &selections))
    }

    /// Replaces a reference (an id, a list of ids or an embedded record)
    /// with the expanded record of `model`.
    #[async_recursion]
    async fn follow(
        &self,
        reference: Value,
        model: &str,
        selections: &Map<String, Value>,
    ) -> EngineResult<Value> {
        match reference {
            Value::Null => Ok(Value::Null),
            Value::Array(ids) => {
                let mut followed = Vec::with_capacity(ids.len());
                for id in ids {
                    followed.push(self.follow(id, model, selections).await?);
                }
                Ok(Value::Array(followed))
            }
            Value::Object(_) => self.expand(reference, model, selections).await,
            id => match self.load(model, &record_id(&id)?).await? {
                Some(record) => self.expand(record, model, selections).await,
                None => {
                    debug!(model, %id, "dangling reference");
                    Ok(Value::Null)
                }
            },
        }
    }
}

/// `{"model", "id", "selections"?}` to the record projected to the selected
/// top-level fields, or `null` when no such record exists. References are
/// left as ids.
pub struct Read;

#[async_trait]
impl Operator for Read {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let input = call.input()?.require_value(call.name())?;
        let model = input
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::validation(call.name(), "'model' must be a string"))?;
        let id = record_id(input.get("id").unwrap_or(&Value::Null))?;
        let selections = input.get("selections").cloned().unwrap_or(Value::Null);

        let records = Records::from_call(&call)?;
        let record = records.load(model, &id).await?;
        Ok(OperatorOutput::Ready(
            record
                .map(|record| project(&record, &selections))
                .unwrap_or(Value::Null),
        ))
    }
}

/// Left: a record, a list of records or `null`. Right: `{"model",
/// "selections"}`. Reference fields with a nested selection are replaced by
/// the referenced record, recursively.
pub struct Expand;

#[async_trait]
impl Operator for Expand {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let value = call.left()?.require_value(call.name())?.clone();
        let target = call.right()?.require_value(call.name())?;
        let model = target
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::validation(call.name(), "'model' must be a string"))?;
        let empty = Map::new();
        let selections = target
            .get("selections")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let records = Records::from_call(&call)?;
        let expanded = records.expand(value, model, selections).await?;
        Ok(OperatorOutput::Ready(expanded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_selects_top_level_fields() {
        let record = json!({"id": "1", "title": "Hello", "author": "2"});
        assert_eq!(
            project(&record, &json!({"author": {"name": {}}, "missing": {}})),
            json!({"author": "2", "missing": null})
        );
        assert_eq!(project(&record, &json!({})), record);
        assert_eq!(
            project(&json!([{"a": 1, "b": 2}]), &json!({"a": {}})),
            json!([{"a": 1}])
        );
    }
}
