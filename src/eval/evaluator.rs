//! # Step Evaluator
//!
//! Walks a script's steps in order and threads an immutable [`Context`]
//! forward. Each step goes through one or more *turns*:
//!
//! 1. resolve the operator in the [`OperatorCatalog`]
//! 2. resolve (eager) or defer (lazy, iterative) the operands, applying
//!    declared defaults
//! 3. validate resolved operands against the declared schemas
//! 4. resolve declared services through the [`DependencyResolver`]
//! 5. consult the [`OperatorCache`] for cacheable operators
//! 6. invoke the operator
//!
//! An iterative operator that returns [`OperatorOutput::Pending`] leaves the
//! step suspended; its [`MethodState`] stays in the invocation's
//! [`MethodStates`] and the scheduler loop yields to tokio before the next
//! turn. The state is removed when the step completes or fails.
//!
//! Operand expressions that are nested step trees are driven to completion by
//! [`Evaluator::evaluate`] with their own state table, so their progress is
//! never visible to the enclosing step.

use std::sync::Arc;

use async_recursion::async_recursion;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::cache::{CacheKey, OperatorCache};
use crate::config::EngineConfig;
use crate::dependency::{DependencyResolver, ResolutionScope};
use crate::error::{EngineError, EngineResult};
use crate::operator::catalog::OperatorCatalog;
use crate::operator::definition::{Arity, Laziness, OperandSchemas, OperatorDefinition};
use crate::operator::operator::{Operand, OperatorCall, OperatorOutput, Operands};
use crate::operator::schema::SchemaValidator;

use super::context::Context;
use super::script::{Expression, Script, Step};
use super::state::{MethodState, MethodStates, StepInstanceId};
use super::thunk::Thunk;

/// Result of one scheduling turn of one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Complete(Value),
    Suspended,
}

#[derive(Clone)]
pub struct Evaluator {
    catalog: Arc<OperatorCatalog>,
    resolver: Arc<DependencyResolver>,
    cache: Arc<OperatorCache>,
    validator: Arc<dyn SchemaValidator>,
    config: Arc<EngineConfig>,
}

impl Evaluator {
    pub fn new(
        catalog: Arc<OperatorCatalog>,
        resolver: Arc<DependencyResolver>,
        cache: Arc<OperatorCache>,
        validator: Arc<dyn SchemaValidator>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            cache,
            validator,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<OperatorCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<OperatorCache> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs every step and returns the final context. The first failure
    /// aborts the remaining steps.
    #[instrument(
        level = "debug",
        skip_all,
        fields(correlation_id = %context.correlation_id(), steps = script.len())
    )]
    pub async fn run(
        &self,
        script: &Script,
        context: Context,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<Context> {
        let mut states = MethodStates::new();
        let mut context = context;

        for (index, step) in script.steps.iter().enumerate() {
            let id = StepInstanceId::root(index);
            let value = self.drive(step, &context, &id, &mut states, scope).await?;
            context = match &step.target {
                Some(target) => context.bind(target, value),
                None => context.with_data(value),
            };
        }

        Ok(context)
    }

    /// Takes turns on `step` until it completes, yielding to the runtime
    /// between turns.
    pub async fn drive(
        &self,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        states: &mut MethodStates,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<Value> {
        let mut turns = 0usize;
        loop {
            match self.turn(step, context, id, states, scope).await? {
                StepOutcome::Complete(value) => return Ok(value),
                StepOutcome::Suspended => {
                    turns += 1;
                    if let Some(max_turns) = self.config.scheduler.max_turns {
                        if turns >= max_turns {
                            states.remove(id);
                            return Err(EngineError::runtime(
                                &step.operator,
                                format!("{} did not complete within {} turns", id, max_turns),
                            ));
                        }
                    }
                    trace!(%id, turns, "step suspended");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// One scheduling turn of `step`.
    pub async fn turn(
        &self,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        states: &mut MethodStates,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<StepOutcome> {
        let result = self.turn_inner(step, context, id, states, scope).await;
        match &result {
            Ok(StepOutcome::Complete(_)) => {
                states.remove(id);
                trace!(%id, operator = %step.operator, "step complete");
            }
            Ok(StepOutcome::Suspended) => {}
            Err(e) => {
                states.remove(id);
                debug!(%id, operator = %step.operator, error = %e, "step failed");
            }
        }
        result
    }

    async fn turn_inner(
        &self,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        states: &mut MethodStates,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<StepOutcome> {
        let definition = self.catalog.resolve(&step.operator)?;
        check_shape(&definition, step)?;

        let operands = match definition.laziness() {
            Laziness::Eager => {
                self.eager_operands(&definition, step, context, id, scope)
                    .await?
            }
            Laziness::Lazy => self.lazy_operands(&definition, step, context, id, scope),
            Laziness::Iterative => {
                if !states.get(id).is_some_and(|s| s.collection.is_some()) {
                    let state = self
                        .materialize(&definition, step, context, id, scope)
                        .await?;
                    *states.entry(id) = state;
                }
                // the collection lives in the step's MethodState
                let right = self.thunk(
                    step.right.as_ref(),
                    definition.defaults().right.as_ref(),
                    context,
                    id,
                    "right",
                    scope,
                );
                Operands::Binary(Operand::Value(Value::Null), Operand::Deferred(right))
            }
        };

        let deps = self
            .resolver
            .resolve_all(definition.requires(), scope)
            .await?;

        let policy = definition.cache_policy();
        let cache_key = if policy.is_cacheable() && self.config.cache.enabled {
            let values = operands.values().unwrap_or_default();
            let key = CacheKey::new(
                definition.name(),
                &values,
                self.config.cache.max_key_depth,
            )?;
            if let Some(hit) = self.cache.get(&key) {
                trace!(%id, operator = definition.name(), "cache hit");
                return Ok(StepOutcome::Complete(hit));
            }
            Some(key)
        } else {
            None
        };

        let state = match definition.laziness() {
            Laziness::Iterative => {
                let state = states.entry(id);
                state.turns += 1;
                Some(state)
            }
            _ => None,
        };

        let call = OperatorCall {
            definition: &definition,
            operands,
            deps: &deps,
            context,
            state,
            slice_size: self.config.iteration.slice_size,
        };
        trace!(%id, operator = definition.name(), "invoking");

        let value = match definition.operator().execute(call).await? {
            OperatorOutput::Ready(value) => value,
            OperatorOutput::Deferred(thunk) => thunk.force().await?,
            OperatorOutput::Pending if definition.laziness() == Laziness::Iterative => {
                return Ok(StepOutcome::Suspended);
            }
            OperatorOutput::Pending => {
                return Err(EngineError::validation(
                    definition.name(),
                    "Only iterative operators may suspend",
                ));
            }
        };

        if let Some(key) = cache_key {
            self.cache.insert(key, value.clone(), policy);
        }
        Ok(StepOutcome::Complete(value))
    }

    /// Resolves an operand expression to a value.
    #[async_recursion]
    pub async fn evaluate(
        &self,
        expression: &Expression,
        context: &Context,
        id: &StepInstanceId,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<Value> {
        match expression {
            Expression::Literal(value) | Expression::Escaped(value) => Ok(value.clone()),
            Expression::Pointer(pointer) => Ok(context.lookup(pointer)),
            Expression::Step(step) => {
                let mut states = MethodStates::new();
                self.drive(step, context, id, &mut states, scope).await
            }
        }
    }

    async fn eager_operands(
        &self,
        definition: &OperatorDefinition,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<Operands> {
        let defaults = definition.defaults();
        match definition.schemas() {
            OperandSchemas::Nullary => Ok(Operands::Nullary),
            OperandSchemas::Unary { input } => {
                let value = self
                    .operand(
                        step.input.as_ref(),
                        defaults.input.as_ref(),
                        context,
                        id,
                        "input",
                        scope,
                    )
                    .await?;
                self.validate(definition, "input", input, &value)?;
                Ok(Operands::Unary(Operand::Value(value)))
            }
            OperandSchemas::Binary { left, right } => {
                let left_value = self
                    .operand(
                        step.left.as_ref(),
                        defaults.left.as_ref(),
                        context,
                        id,
                        "left",
                        scope,
                    )
                    .await?;
                self.validate(definition, "left", left, &left_value)?;
                let right_value = self
                    .operand(
                        step.right.as_ref(),
                        defaults.right.as_ref(),
                        context,
                        id,
                        "right",
                        scope,
                    )
                    .await?;
                self.validate(definition, "right", right, &right_value)?;
                Ok(Operands::Binary(
                    Operand::Value(left_value),
                    Operand::Value(right_value),
                ))
            }
        }
    }

    fn lazy_operands(
        &self,
        definition: &OperatorDefinition,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        scope: &Arc<ResolutionScope>,
    ) -> Operands {
        let defaults = definition.defaults();
        let defer = |expression: Option<&Expression>, default: Option<&Value>, slot: &str| {
            Operand::Deferred(self.thunk(expression, default, context, id, slot, scope))
        };
        match definition.arity() {
            Arity::Nullary => Operands::Nullary,
            Arity::Unary => Operands::Unary(defer(
                step.input.as_ref(),
                defaults.input.as_ref(),
                "input",
            )),
            Arity::Binary => Operands::Binary(
                defer(step.left.as_ref(), defaults.left.as_ref(), "left"),
                defer(step.right.as_ref(), defaults.right.as_ref(), "right"),
            ),
        }
    }

    async fn operand(
        &self,
        expression: Option<&Expression>,
        default: Option<&Value>,
        context: &Context,
        id: &StepInstanceId,
        slot: &str,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<Value> {
        let value = match expression {
            Some(expression) => Some(
                self.evaluate(expression, context, &id.child(slot), scope)
                    .await?,
            ),
            None => None,
        };
        Ok(apply_default(value, default))
    }

    /// A deferred operand. An absent operand defers its declared default.
    fn thunk(
        &self,
        expression: Option<&Expression>,
        default: Option<&Value>,
        context: &Context,
        id: &StepInstanceId,
        slot: &str,
        scope: &Arc<ResolutionScope>,
    ) -> Thunk {
        let expression = match (expression, default) {
            (Some(expression), _) => expression.clone(),
            (None, Some(default)) => Expression::Literal(default.clone()),
            (None, None) => Expression::Literal(Value::Null),
        };
        Thunk::new(
            expression,
            context.clone(),
            self.clone(),
            scope.clone(),
            id.child(slot),
        )
    }

    /// Forces the collection operand of an iterative step.
    ///
    /// The collection is either an array or `{"items": [...], "initial": x}`,
    /// where `initial` seeds the accumulator. A literal object of that shape
    /// has its members evaluated individually so `items` may be a pointer.
    async fn materialize(
        &self,
        definition: &OperatorDefinition,
        step: &Step,
        context: &Context,
        id: &StepInstanceId,
        scope: &Arc<ResolutionScope>,
    ) -> EngineResult<MethodState> {
        let left = self.thunk(
            step.left.as_ref(),
            definition.defaults().left.as_ref(),
            context,
            id,
            "left",
            scope,
        );
        let (items, initial) = match left.expression().member("items") {
            Some(_) => (left.force_member("items").await?, left.force_member("initial").await?),
            None => match left.force().await? {
                Value::Object(mut map) if map.contains_key("items") => (
                    map.remove("items").unwrap_or(Value::Null),
                    map.remove("initial").unwrap_or(Value::Null),
                ),
                value => (value, Value::Null),
            },
        };

        if let OperandSchemas::Binary { left: schema, .. } = definition.schemas() {
            self.validate(definition, "left", schema, &items)?;
        }
        let collection = match items {
            Value::Array(items) => items,
            other => {
                return Err(EngineError::validation(
                    definition.name(),
                    format!("Iteration needs an array, found {}", other),
                ));
            }
        };
        debug!(
            %id,
            operator = definition.name(),
            len = collection.len(),
            "collection materialized"
        );

        Ok(MethodState {
            index: 0,
            accumulator: initial,
            collection: Some(collection),
            turns: 0,
        })
    }

    fn validate(
        &self,
        definition: &OperatorDefinition,
        slot: &str,
        schema: &Value,
        value: &Value,
    ) -> EngineResult<()> {
        self.validator.validate(schema, value).map_err(|message| {
            EngineError::validation(definition.name(), format!("{} {}", slot, message))
        })
    }
}

/// Rejects operand slots the operator's arity has no place for.
fn check_shape(definition: &OperatorDefinition, step: &Step) -> EngineResult<()> {
    let misplaced = match definition.schemas() {
        OperandSchemas::Nullary => {
            step.input.is_some() || step.left.is_some() || step.right.is_some()
        }
        OperandSchemas::Unary { .. } => step.left.is_some() || step.right.is_some(),
        OperandSchemas::Binary { .. } => step.input.is_some(),
    };
    if misplaced {
        return Err(EngineError::validation(
            definition.name(),
            format!("Step operands do not match {} arity", definition.arity()),
        ));
    }
    Ok(())
}

/// An absent operand takes the default; an object operand inherits the
/// members of an object default it does not set itself.
fn apply_default(value: Option<Value>, default: Option<&Value>) -> Value {
    match (value, default) {
        (Some(Value::Object(mut map)), Some(Value::Object(defaults))) => {
            for (key, default) in defaults {
                map.entry(key.clone()).or_insert_with(|| default.clone());
            }
            Value::Object(map)
        }
        (Some(value), _) => value,
        (None, Some(default)) => default.clone(),
        (None, None) => Value::Null,
    }
}
