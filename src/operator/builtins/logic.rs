use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::EngineResult;
use crate::operator::operator::{Operator, OperatorCall, OperatorOutput};

/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy; everything else is
/// truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Short-circuit conjunction. The right operand is forced only when the
/// left one is truthy.
pub struct And;

#[async_trait]
impl Operator for And {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        if !truthy(&call.left()?.resolve().await?) {
            return Ok(OperatorOutput::Ready(Value::Bool(false)));
        }
        let right = call.right()?.resolve().await?;
        Ok(OperatorOutput::Ready(Value::Bool(truthy(&right))))
    }
}

pub struct Or;

#[async_trait]
impl Operator for Or {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        if truthy(&call.left()?.resolve().await?) {
            return Ok(OperatorOutput::Ready(Value::Bool(true)));
        }
        let right = call.right()?.resolve().await?;
        Ok(OperatorOutput::Ready(Value::Bool(truthy(&right))))
    }
}

pub struct Not;

#[async_trait]
impl Operator for Not {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let input = call.input()?.require_value(call.name())?;
        Ok(OperatorOutput::Ready(Value::Bool(!truthy(input))))
    }
}

/// Deep JSON equality.
pub struct Equals;

#[async_trait]
impl Operator for Equals {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let left = call.left()?.require_value(call.name())?;
        let right = call.right()?.require_value(call.name())?;
        Ok(OperatorOutput::Ready(Value::Bool(left == right)))
    }
}

/// `{"test": ..., "then": ..., "else": ...}`; only the selected branch is
/// evaluated. A missing branch yields `null`.
pub struct If;

#[async_trait]
impl Operator for If {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let input = call.input()?.require_thunk(call.name())?;
        let branch = if truthy(&input.force_member("test").await?) {
            "then"
        } else {
            "else"
        };
        Ok(OperatorOutput::Ready(input.force_member(branch).await?))
    }
}

/// Yields the left operand, or on a runtime failure the right operand
/// evaluated against `{"error": <message>}`. Validation and lookup failures
/// are not caught.
pub struct Try;

#[async_trait]
impl Operator for Try {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let left = call.left()?.require_thunk(call.name())?;
        match left.force().await {
            Ok(value) => Ok(OperatorOutput::Ready(value)),
            Err(e) if e.is_runtime() => {
                debug!(error = %e, "recovering from operator failure");
                let right = call.right()?.require_thunk(call.name())?;
                let value = right
                    .evaluate_with(json!({"error": e.to_string()}))
                    .await?;
                Ok(OperatorOutput::Ready(value))
            }
            Err(e) => Err(e),
        }
    }
}
