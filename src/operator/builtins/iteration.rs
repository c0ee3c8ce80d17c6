//! Collection operators that run in slices.
//!
//! The evaluator materializes the left operand into the step's
//! [`MethodState`](crate::eval::state::MethodState) before the first turn.
//! Each turn visits at most `slice_size` elements, evaluating the right
//! operand once per element with the element as pointer root, and returns
//! [`OperatorOutput::Pending`] until the collection is exhausted.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::operator::operator::{Operator, OperatorCall, OperatorOutput};

use super::logic::truthy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IterationKind {
    /// Keeps elements whose right operand is truthy.
    Filter,
    /// Collects the right operand of every element.
    Map,
    /// Folds with the right operand evaluated against `{"acc", "item"}`.
    Reduce,
}

pub struct Iterate(pub IterationKind);

#[async_trait]
impl Operator for Iterate {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        let name = call.name().to_string();
        let slice_size = call.slice_size;
        let body = call.right()?.require_thunk(&name)?.clone();
        let state = call
            .state
            .ok_or_else(|| EngineError::validation(&name, "Missing iteration state"))?;

        let slice = state.slice(slice_size);
        if state.index == 0 && self.0 != IterationKind::Reduce && !state.accumulator.is_array() {
            state.accumulator = Value::Array(Vec::new());
        }
        let collection = state
            .collection
            .as_ref()
            .ok_or_else(|| EngineError::validation(&name, "Collection not materialized"))?;

        for item in &collection[slice.clone()] {
            match self.0 {
                IterationKind::Filter => {
                    if truthy(&body.evaluate_with(item.clone()).await?) {
                        push(&mut state.accumulator, item.clone());
                    }
                }
                IterationKind::Map => {
                    let mapped = body.evaluate_with(item.clone()).await?;
                    push(&mut state.accumulator, mapped);
                }
                IterationKind::Reduce => {
                    let acc = std::mem::take(&mut state.accumulator);
                    state.accumulator = body
                        .evaluate_with(json!({"acc": acc, "item": item}))
                        .await?;
                }
            }
        }

        state.index = slice.end;
        trace!(operator = %name, index = state.index, len = state.len(), "slice done");
        if state.is_exhausted() {
            Ok(OperatorOutput::Ready(std::mem::take(&mut state.accumulator)))
        } else {
            Ok(OperatorOutput::Pending)
        }
    }
}

fn push(accumulator: &mut Value, value: Value) {
    if let Value::Array(items) = accumulator {
        items.push(value);
    }
}
