use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

use super::operator::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Arity {
    Nullary,
    Unary,
    Binary,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Laziness {
    #[default]
    Eager,
    Lazy,
    Iterative,
}

impl Laziness {
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Laziness::Eager)
    }
}

/// Memoization eligibility of an operator's results.
///
/// Serialized as `"never"`, `"forever"` or `{"ttl": <seconds>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    #[default]
    Never,
    Forever,
    Ttl(u64),
}

impl CachePolicy {
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, CachePolicy::Never)
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::Ttl(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Never => write!(f, "never"),
            CachePolicy::Forever => write!(f, "forever"),
            CachePolicy::Ttl(secs) => write!(f, "ttl({}s)", secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperandDefaults {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub left: Option<Value>,
    #[serde(default)]
    pub right: Option<Value>,
}

/// Declarative half of an operator, as written by the operator's author or
/// loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorDecl {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub left: Option<Value>,
    #[serde(default)]
    pub right: Option<Value>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
    #[serde(default)]
    pub lazy: Laziness,
    #[serde(default)]
    pub defaults: OperandDefaults,
}

impl OperatorDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn unary(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn binary(mut self, left: Value, right: Value) -> Self {
        self.left = Some(left);
        self.right = Some(right);
        self
    }

    pub fn requires(mut self, services: &[&str]) -> Self {
        self.requires = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    pub fn lazy(mut self, laziness: Laziness) -> Self {
        self.lazy = laziness;
        self
    }

    pub fn default_input(mut self, value: Value) -> Self {
        self.defaults.input = Some(value);
        self
    }

    pub fn default_left(mut self, value: Value) -> Self {
        self.defaults.left = Some(value);
        self
    }

    pub fn default_right(mut self, value: Value) -> Self {
        self.defaults.right = Some(value);
        self
    }
}

/// Declared operand schemas, one variant per arity.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandSchemas {
    Nullary,
    Unary { input: Value },
    Binary { left: Value, right: Value },
}

impl OperandSchemas {
    pub fn arity(&self) -> Arity {
        match self {
            OperandSchemas::Nullary => Arity::Nullary,
            OperandSchemas::Unary { .. } => Arity::Unary,
            OperandSchemas::Binary { .. } => Arity::Binary,
        }
    }

    fn infer(decl: &OperatorDecl) -> EngineResult<Self> {
        match (&decl.input, &decl.left, &decl.right) {
            (None, None, None) => Ok(OperandSchemas::Nullary),
            (Some(input), None, None) => Ok(OperandSchemas::Unary {
                input: input.clone(),
            }),
            (None, Some(left), Some(right)) => Ok(OperandSchemas::Binary {
                left: left.clone(),
                right: right.clone(),
            }),
            (Some(_), _, _) => Err(EngineError::validation(
                &decl.name,
                "Ambiguous declaration: both 'input' and 'left'/'right' schemas",
            )),
            _ => Err(EngineError::validation(
                &decl.name,
                "Binary declarations need both 'left' and 'right' schemas",
            )),
        }
    }
}

/// A registered operator: validated declaration plus execution object.
pub struct OperatorDefinition {
    name: String,
    symbol: Option<String>,
    schemas: OperandSchemas,
    laziness: Laziness,
    cache: CachePolicy,
    requires: Vec<String>,
    defaults: OperandDefaults,
    operator: Arc<dyn Operator>,
}

impl fmt::Debug for OperatorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorDefinition")
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("schemas", &self.schemas)
            .field("laziness", &self.laziness)
            .field("cache", &self.cache)
            .field("requires", &self.requires)
            .finish()
    }
}

impl OperatorDefinition {
    pub fn from_decl(decl: OperatorDecl, operator: Arc<dyn Operator>) -> EngineResult<Self> {
        if decl.name.is_empty() {
            return Err(EngineError::validation("<unnamed>", "Operator name is empty"));
        }
        let schemas = OperandSchemas::infer(&decl)?;
        let arity = schemas.arity();

        if decl.lazy == Laziness::Iterative && arity != Arity::Binary {
            return Err(EngineError::validation(
                &decl.name,
                format!("Iterative operators must be binary, found {}", arity),
            ));
        }
        let cache = decl.cache.unwrap_or_default();
        if decl.lazy.is_deferred() && cache.is_cacheable() {
            return Err(EngineError::validation(
                &decl.name,
                format!("{} operators cannot declare cache policy {}", decl.lazy, cache),
            ));
        }
        let misplaced_default = match arity {
            Arity::Nullary => {
                decl.defaults.input.is_some()
                    || decl.defaults.left.is_some()
                    || decl.defaults.right.is_some()
            }
            Arity::Unary => decl.defaults.left.is_some() || decl.defaults.right.is_some(),
            Arity::Binary => decl.defaults.input.is_some(),
        };
        if misplaced_default {
            return Err(EngineError::validation(
                &decl.name,
                format!("Default operand does not match {} arity", arity),
            ));
        }

        Ok(Self {
            name: decl.name,
            symbol: decl.symbol,
            schemas,
            laziness: decl.lazy,
            cache,
            requires: decl.requires,
            defaults: decl.defaults,
            operator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn arity(&self) -> Arity {
        self.schemas.arity()
    }

    pub fn schemas(&self) -> &OperandSchemas {
        &self.schemas
    }

    pub fn laziness(&self) -> Laziness {
        self.laziness
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn defaults(&self) -> &OperandDefaults {
        &self.defaults
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }
}
