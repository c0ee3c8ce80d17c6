use thiserror::Error;

use crate::config::ConfigError;

/// Failures raised while registering operators, resolving services or
/// evaluating a script.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Validation error in {operator}: {message}")]
    Validation { operator: String, message: String },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Duplicate operator: {0}")]
    DuplicateOperator(String),

    #[error("Cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Operator {operator} failed: {message}")]
    OperatorRuntime { operator: String, message: String },

    #[error("Cache key error in {operator}: {message}")]
    CacheKey { operator: String, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

// helpers for the variants operators build most often
impl EngineError {
    pub fn validation<O: Into<String>, M: Into<String>>(operator: O, message: M) -> Self {
        EngineError::Validation {
            operator: operator.into(),
            message: message.into(),
        }
    }

    pub fn runtime<O: Into<String>, M: Into<String>>(operator: O, message: M) -> Self {
        EngineError::OperatorRuntime {
            operator: operator.into(),
            message: message.into(),
        }
    }

    pub fn not_found<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        EngineError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Runtime failures are the only ones a `try` step may swallow.
    pub fn is_runtime(&self) -> bool {
        matches!(self, EngineError::OperatorRuntime { .. })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_message_lists_chain() {
        let err = EngineError::CyclicDependency {
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_only_runtime_errors_are_catchable() {
        assert!(EngineError::runtime("read", "boom").is_runtime());
        assert!(!EngineError::validation("read", "bad").is_runtime());
        assert!(!EngineError::UnknownOperator("x".into()).is_runtime());
    }
}
