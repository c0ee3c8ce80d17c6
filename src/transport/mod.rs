//! Translation contract between a query transport and the evaluator.
//!
//! A transport (a GraphQL front end, for instance) parses its own documents
//! and hands the engine one [`FieldInvocation`] per top-level field, with
//! every parameter already resolved. The engine only depends on this shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{EngineError, EngineResult};
use crate::eval::pointer;
use crate::eval::script::{ESCAPE_KEY, Script, Step};
use crate::operator::catalog::OperatorCatalog;
use crate::operator::definition::{Arity, OperatorDefinition};
use crate::persistence::PERSISTENCE_SERVICE;

pub const EXPAND_OPERATOR: &str = "expand";

/// Requested fields, nested: `{"title": {}, "author": {"name": {}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet(BTreeMap<String, SelectionSet>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, nested: SelectionSet) -> Self {
        self.0.insert(name.to_string(), nested);
        self
    }

    pub fn leaf(self, name: &str) -> Self {
        self.field(name, SelectionSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any selected field selects fields of its own.
    pub fn is_nested(&self) -> bool {
        self.0.values().any(|nested| !nested.is_empty())
    }

    pub fn field_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, nested)| (name.clone(), nested.to_value()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInvocation {
    pub invocation_name: String,
    pub alias: String,
    pub operator: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub selections: SelectionSet,
    /// Immediate child field names, flattened.
    #[serde(default)]
    pub child_fields: Vec<String>,
}

impl FieldInvocation {
    pub fn new(invocation_name: &str, operator: &str) -> Self {
        Self {
            invocation_name: invocation_name.to_string(),
            alias: invocation_name.to_string(),
            operator: operator.to_string(),
            parameters: Map::new(),
            selections: SelectionSet::new(),
            child_fields: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn parameter(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn selections(mut self, selections: SelectionSet) -> Self {
        self.child_fields = selections.field_names();
        self.selections = selections;
        self
    }

    /// Model the field reads, from the `model` parameter or else the
    /// invocation name.
    pub fn model(&self) -> &str {
        self.parameters
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.invocation_name)
    }

    /// The operator step bound to the alias, followed by an expansion step
    /// when a record read's selection set reaches into referenced records.
    ///
    /// Parameters fill the operand slots the operator declares:
    ///
    /// - nullary: no parameters are accepted
    /// - unary record read (requires `persistence`): every parameter plus
    ///   `model` (defaulting to the invocation name) and `selections`
    /// - other unary: a lone `input` parameter, or else all parameters as one
    ///   object; no parameters leaves the declared default in place
    /// - binary: the `left` and `right` parameters
    ///
    /// Parameters are passed escaped: they are final values, so a string
    /// starting with `/` stays a string.
    pub fn to_script(&self, catalog: &OperatorCatalog) -> EngineResult<Script> {
        let definition = catalog.resolve(&self.operator)?;
        let record_read = reads_records(&definition);
        let step = Step::new(&self.operator).set(&self.alias);

        let step = match definition.arity() {
            Arity::Nullary => {
                if let Some(name) = self.parameters.keys().next() {
                    return Err(self.unexpected_parameter(name));
                }
                step
            }
            Arity::Unary if record_read => {
                let mut input = self.parameters.clone();
                input
                    .entry("model")
                    .or_insert_with(|| Value::String(self.invocation_name.clone()));
                input.insert("selections".to_string(), self.selections.to_value());
                step.input(escaped(Value::Object(input)))
            }
            Arity::Unary => match self.parameters.get("input") {
                Some(input) if self.parameters.len() == 1 => step.input(escaped(input.clone())),
                _ if self.parameters.is_empty() => step,
                _ => step.input(escaped(Value::Object(self.parameters.clone()))),
            },
            Arity::Binary => {
                if let Some(name) = self
                    .parameters
                    .keys()
                    .find(|name| *name != "left" && *name != "right")
                {
                    return Err(self.unexpected_parameter(name));
                }
                let mut step = step;
                if let Some(left) = self.parameters.get("left") {
                    step = step.left(escaped(left.clone()));
                }
                if let Some(right) = self.parameters.get("right") {
                    step = step.right(escaped(right.clone()));
                }
                step
            }
        };

        let mut steps = vec![step];
        if record_read && self.selections.is_nested() {
            steps.push(
                Step::new(EXPAND_OPERATOR)
                    .set(&self.alias)
                    .left(Value::String(pointer::from_segments(&[&self.alias])))
                    .right(escaped(json!({
                        "model": self.model(),
                        "selections": self.selections.to_value(),
                    }))),
            );
        }
        Ok(Script::new(steps))
    }

    fn unexpected_parameter(&self, name: &str) -> EngineError {
        EngineError::validation(
            &self.operator,
            format!("Field {} has no operand for parameter '{}'", self.alias, name),
        )
    }
}

fn reads_records(definition: &OperatorDefinition) -> bool {
    definition.arity() == Arity::Unary
        && definition
            .requires()
            .iter()
            .any(|service| service == PERSISTENCE_SERVICE)
}

fn escaped(value: Value) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert(ESCAPE_KEY.to_string(), value);
    Value::Object(wrapper)
}

/// One script for all top-level fields, in order.
pub fn translate(catalog: &OperatorCatalog, fields: &[FieldInvocation]) -> EngineResult<Script> {
    let mut steps = Vec::new();
    for field in fields {
        steps.extend(field.to_script(catalog)?.steps);
    }
    Ok(Script::new(steps))
}
