use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::trace;

use crate::dependency::ResolutionScope;
use crate::error::EngineResult;

use super::context::Context;
use super::evaluator::Evaluator;
use super::script::Expression;
use super::state::StepInstanceId;

/// An unevaluated operand, bound to the context it was written in.
///
/// Clones share the memoized value, so forcing any clone forces them all.
#[derive(Clone)]
pub struct Thunk {
    expression: Arc<Expression>,
    context: Context,
    evaluator: Evaluator,
    scope: Arc<ResolutionScope>,
    id: StepInstanceId,
    memo: Arc<OnceCell<Value>>,
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("forced", &self.is_forced())
            .finish()
    }
}

impl Thunk {
    pub(crate) fn new(
        expression: Expression,
        context: Context,
        evaluator: Evaluator,
        scope: Arc<ResolutionScope>,
        id: StepInstanceId,
    ) -> Self {
        Self {
            expression: Arc::new(expression),
            context,
            evaluator,
            scope,
            id,
            memo: Arc::new(OnceCell::new()),
        }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn is_forced(&self) -> bool {
        self.memo.initialized()
    }

    /// Evaluates the operand once; later calls return the memoized value.
    /// Failures are not memoized.
    pub async fn force(&self) -> EngineResult<Value> {
        let value = self
            .memo
            .get_or_try_init(|| async {
                trace!(id = %self.id, "forcing thunk");
                self.evaluator
                    .evaluate(&self.expression, &self.context, &self.id, &self.scope)
                    .await
            })
            .await?;
        Ok(value.clone())
    }

    /// Evaluates the operand with the pointer root moved to `data`. Used for
    /// per-element operands, so nothing is memoized.
    pub async fn evaluate_with(&self, data: Value) -> EngineResult<Value> {
        let context = self.context.with_data(data);
        self.evaluator
            .evaluate(&self.expression, &context, &self.id, &self.scope)
            .await
    }

    /// Evaluates one member of the operand without touching the others.
    ///
    /// For a literal object the member is parsed and evaluated as an
    /// expression of its own, so `{"test": "/flag", "then": ...}` resolves
    /// `/flag` while leaving the unused branch alone. Any other operand is
    /// forced whole and the member read from the result. A missing member is
    /// `null`.
    pub async fn force_member(&self, key: &str) -> EngineResult<Value> {
        match self.expression.as_ref() {
            Expression::Literal(Value::Object(_)) => match self.expression.member(key) {
                Some(member) => {
                    let id = self.id.child(key);
                    self.evaluator
                        .evaluate(&member, &self.context, &id, &self.scope)
                        .await
                }
                None => Ok(Value::Null),
            },
            _ => Ok(self.force().await?.get(key).cloned().unwrap_or(Value::Null)),
        }
    }
}
