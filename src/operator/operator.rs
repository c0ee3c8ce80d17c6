use async_trait::async_trait;
use serde_json::Value;

use crate::dependency::Dependencies;
use crate::error::{EngineError, EngineResult};
use crate::eval::context::Context;
use crate::eval::state::MethodState;
use crate::eval::thunk::Thunk;

use super::definition::OperatorDefinition;

/// # Operator Interface
///
/// The execution half of an operator. The declarative half (name, arity,
/// schemas, cache policy, laziness, requirements) lives in
/// [`OperatorDecl`](super::definition::OperatorDecl); the catalog pairs the
/// two at registration.
///
/// ## Contract
///
/// * Eager operators receive resolved values; lazy operators receive
///   [`Thunk`]s they may force at most as often as they need.
/// * Iterative operators receive the step's [`MethodState`] with the
///   collection already materialized and must process at most
///   `call.slice_size` elements before returning [`OperatorOutput::Pending`].
/// * Anything with side effects (writes, logging, randomness, clock reads)
///   must be declared `cache: never`. The engine cannot detect impurity.
///
/// ## Implementation Example
///
/// ```ignore
/// struct Upper;
///
/// #[async_trait]
/// impl Operator for Upper {
///     async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
///         let text = call.input()?.require_str(call.name())?;
///         Ok(OperatorOutput::Ready(Value::String(text.to_uppercase())))
///     }
/// }
/// ```
#[async_trait]
pub trait Operator: Send + Sync {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput>;
}

/// What an operator hands back to the evaluator.
#[derive(Debug)]
pub enum OperatorOutput {
    Ready(Value),
    /// Forced by the evaluator before the step completes.
    Deferred(Thunk),
    /// Iteration not finished; re-invoke next turn with the same state.
    Pending,
}

#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Deferred(Thunk),
}

impl Operand {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Deferred(_) => None,
        }
    }

    pub fn thunk(&self) -> Option<&Thunk> {
        match self {
            Operand::Deferred(t) => Some(t),
            Operand::Value(_) => None,
        }
    }

    /// The operand's value, forcing it if deferred.
    pub async fn resolve(&self) -> EngineResult<Value> {
        match self {
            Operand::Value(v) => Ok(v.clone()),
            Operand::Deferred(t) => t.force().await,
        }
    }

    pub fn require_value(&self, operator: &str) -> EngineResult<&Value> {
        self.value().ok_or_else(|| {
            EngineError::validation(operator, "Operand is deferred, expected a value")
        })
    }

    pub fn require_thunk(&self, operator: &str) -> EngineResult<&Thunk> {
        self.thunk().ok_or_else(|| {
            EngineError::validation(operator, "Operand is a value, expected a deferred operand")
        })
    }

    pub fn require_str(&self, operator: &str) -> EngineResult<&str> {
        self.require_value(operator)?
            .as_str()
            .ok_or_else(|| EngineError::validation(operator, "Operand must be a string"))
    }
}

#[derive(Debug, Clone)]
pub enum Operands {
    Nullary,
    Unary(Operand),
    Binary(Operand, Operand),
}

impl Operands {
    /// Resolved values in declaration order, `None` if any operand is deferred.
    pub fn values(&self) -> Option<Vec<&Value>> {
        match self {
            Operands::Nullary => Some(vec![]),
            Operands::Unary(input) => Some(vec![input.value()?]),
            Operands::Binary(left, right) => Some(vec![left.value()?, right.value()?]),
        }
    }
}

/// One invocation of an operator for one scheduling turn.
pub struct OperatorCall<'a> {
    pub definition: &'a OperatorDefinition,
    pub operands: Operands,
    pub deps: &'a Dependencies,
    pub context: &'a Context,
    /// Present for iterative operators only.
    pub state: Option<&'a mut MethodState>,
    pub slice_size: usize,
}

impl OperatorCall<'_> {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn input(&self) -> EngineResult<&Operand> {
        match &self.operands {
            Operands::Unary(input) => Ok(input),
            _ => Err(self.arity_mismatch("input")),
        }
    }

    pub fn left(&self) -> EngineResult<&Operand> {
        match &self.operands {
            Operands::Binary(left, _) => Ok(left),
            _ => Err(self.arity_mismatch("left")),
        }
    }

    pub fn right(&self) -> EngineResult<&Operand> {
        match &self.operands {
            Operands::Binary(_, right) => Ok(right),
            _ => Err(self.arity_mismatch("right")),
        }
    }

    fn arity_mismatch(&self, slot: &str) -> EngineError {
        EngineError::validation(
            self.name(),
            format!(
                "No '{}' operand on a {} operator",
                slot,
                self.definition.arity()
            ),
        )
    }
}
