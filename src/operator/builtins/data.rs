use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::eval::pointer;
use crate::operator::operator::{Operator, OperatorCall, OperatorOutput};

/// Member lookup: the right operand is a path written without the leading
/// slash (`"author/name"`), so it is not resolved against the context.
pub struct Get;

#[async_trait]
impl Operator for Get {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let target = call.left()?.require_value(call.name())?;
        let path = call.right()?.require_str(call.name())?;
        let value = if path.is_empty() {
            target.clone()
        } else {
            pointer::lookup(target, &format!("/{}", path))
        };
        Ok(OperatorOutput::Ready(value))
    }
}

pub struct Now;

#[async_trait]
impl Operator for Now {
    async fn execute(&self, _call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        Ok(OperatorOutput::Ready(Value::String(Utc::now().to_rfc3339())))
    }
}

/// Raises a runtime failure; string input becomes the message verbatim.
pub struct Fail;

#[async_trait]
impl Operator for Fail {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let message = match call.input()?.require_value(call.name())? {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        };
        Err(EngineError::runtime(call.name(), message))
    }
}
