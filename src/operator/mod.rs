//! Operators and their catalog.
//!
//! An operator is a declaration ([`definition::OperatorDecl`]) paired with an
//! execution object implementing [`operator::Operator`]. The
//! [`catalog::OperatorCatalog`] validates the pair once at registration and
//! hands out the resulting [`definition::OperatorDefinition`] by name or
//! symbol. [`builtins`] holds the operators every engine ships with.

pub mod builtins;
pub mod catalog;
pub mod definition;
#[allow(clippy::module_inception)]
pub mod operator;
pub mod schema;
