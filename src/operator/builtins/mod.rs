//! Operators every engine ships with.
//!
//! | name     | symbol | arity  | laziness  | cache   |
//! |----------|--------|--------|-----------|---------|
//! | `and`    | `&&`   | binary | lazy      | never   |
//! | `or`     | `\|\|` | binary | lazy      | never   |
//! | `not`    | `!`    | unary  | eager     | never   |
//! | `eq`     | `==`   | binary | eager     | never   |
//! | `if`     |        | unary  | lazy      | never   |
//! | `try`    |        | binary | lazy      | never   |
//! | `fail`   |        | unary  | eager     | never   |
//! | `filter` |        | binary | iterative | never   |
//! | `map`    |        | binary | iterative | never   |
//! | `reduce` |        | binary | iterative | never   |
//! | `get`    |        | binary | eager     | never   |
//! | `now`    |        | none   | eager     | never   |
//! | `read`   |        | unary  | eager     | never   |
//! | `expand` |        | binary | eager     | never   |
//!
//! `read` and `expand` require the `persistence` and `resources` services.
//!
//! None of the builtins is cached: their operands are usually request data,
//! and recomputing them costs less than keeping one entry per payload.

mod data;
mod iteration;
mod logic;
mod records;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::EngineResult;
use crate::persistence::{PERSISTENCE_SERVICE, RESOURCES_SERVICE};

use super::catalog::OperatorCatalog;
use super::definition::{Laziness, OperatorDecl};

pub use data::{Fail, Get, Now};
pub use iteration::{Iterate, IterationKind};
pub use logic::{And, Equals, If, Not, Or, Try, truthy};
pub use records::{Expand, Read, project};

fn any() -> Value {
    json!({})
}

fn array() -> Value {
    json!({"type": "array"})
}

pub fn register_builtins(catalog: &OperatorCatalog) -> EngineResult<()> {
    catalog.register(
        OperatorDecl::new("and")
            .symbol("&&")
            .binary(any(), any())
            .lazy(Laziness::Lazy),
        Arc::new(And),
    )?;
    catalog.register(
        OperatorDecl::new("or")
            .symbol("||")
            .binary(any(), any())
            .lazy(Laziness::Lazy),
        Arc::new(Or),
    )?;
    catalog.register(
        OperatorDecl::new("not")
            .symbol("!")
            .unary(any()),
        Arc::new(Not),
    )?;
    catalog.register(
        OperatorDecl::new("eq")
            .symbol("==")
            .binary(any(), any()),
        Arc::new(Equals),
    )?;
    catalog.register(
        OperatorDecl::new("if")
            .unary(any())
            .lazy(Laziness::Lazy),
        Arc::new(If),
    )?;
    catalog.register(
        OperatorDecl::new("try")
            .binary(any(), any())
            .lazy(Laziness::Lazy),
        Arc::new(Try),
    )?;
    catalog.register(OperatorDecl::new("fail").unary(any()), Arc::new(Fail))?;

    for kind in [
        IterationKind::Filter,
        IterationKind::Map,
        IterationKind::Reduce,
    ] {
        catalog.register(
            OperatorDecl::new(&kind.to_string())
                .binary(array(), any())
                .lazy(Laziness::Iterative),
            Arc::new(Iterate(kind)),
        )?;
    }

    catalog.register(
        OperatorDecl::new("get")
            .binary(
                json!({"type": ["object", "array", "null"]}),
                json!({"type": "string"}),
            ),
        Arc::new(Get),
    )?;
    catalog.register(OperatorDecl::new("now"), Arc::new(Now))?;
    catalog.register(
        OperatorDecl::new("read")
            .unary(json!({
                "type": "object",
                "required": ["model", "id"],
                "properties": {
                    "model": {"type": "string"},
                    "id": {"type": ["string", "integer"]},
                    "selections": {"type": "object"}
                }
            }))
            .default_input(json!({"selections": {}}))
            .requires(&[PERSISTENCE_SERVICE, RESOURCES_SERVICE]),
        Arc::new(Read),
    )?;
    catalog.register(
        OperatorDecl::new("expand")
            .binary(
                json!({"type": ["object", "array", "null"]}),
                json!({
                    "type": "object",
                    "required": ["model", "selections"],
                    "properties": {
                        "model": {"type": "string"},
                        "selections": {"type": "object"}
                    }
                }),
            )
            .requires(&[PERSISTENCE_SERVICE, RESOURCES_SERVICE]),
        Arc::new(Expand),
    )?;

    debug!(count = catalog.len(), "builtin operators registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtins() {
        let catalog = OperatorCatalog::new();
        register_builtins(&catalog).unwrap();

        assert_eq!(catalog.resolve("&&").unwrap().name(), "and");
        assert_eq!(catalog.resolve("!").unwrap().name(), "not");
        assert_eq!(
            catalog.resolve("reduce").unwrap().laziness(),
            Laziness::Iterative
        );
        assert_eq!(catalog.len(), 14);

        // a second registration collides
        assert!(register_builtins(&catalog).is_err());
    }

    #[test]
    fn test_builtins_are_never_cached() {
        let catalog = OperatorCatalog::new();
        register_builtins(&catalog).unwrap();
        for name in catalog.names() {
            let definition = catalog.resolve(&name).unwrap();
            assert!(!definition.cache_policy().is_cacheable(), "{} is cached", name);
        }
    }
}
