//! # stepwise: a script execution engine for backend endpoints
//!
//! Endpoints are written as declarative scripts: ordered steps, each invoking
//! one operator and binding its result to a variable. The engine resolves the
//! operands, the services an operator needs and any cached result, then runs
//! the operator and threads an immutable context to the next step.
//!
//! ## Components
//!
//! - Operator catalog ([`operator::catalog`]): operators by name or symbol,
//!   validated once at registration
//! - Dependency resolver ([`dependency`]): named services with singleton or
//!   request lifetime, mockable per invocation
//! - Context and operand syntax ([`eval::context`], [`eval::script`],
//!   [`eval::pointer`]): pointers, escaped literals, nested step trees
//! - Evaluator ([`eval::evaluator`]): eager, lazy and iterative dispatch with
//!   resumable per-step state ([`eval::state`])
//! - Cache ([`cache`]): per-operator memoization driven by declared policy
//! - Transport contract ([`transport`]): field invocations translated to
//!   scripts
//!
//! [`engine::Engine`] wires them together from an [`config::EngineConfig`].
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), stepwise::Error> {
//! use serde_json::json;
//! use stepwise::{Engine, EngineConfig};
//!
//! let engine = Engine::with_builtins(EngineConfig::default())?;
//! let outcome = engine
//!     .run_json(
//!         r#"[{"set": "visible", "op": "&&", "left": "/published", "right": "/approved"}]"#,
//!         json!({"published": true, "approved": false}),
//!     )
//!     .await?;
//! assert_eq!(outcome.output["visible"], json!(false));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod eval;
pub mod operator;
pub mod persistence;
pub mod transport;

// Re-exports
pub use config::EngineConfig;
pub use engine::{Engine, ScriptOutcome};
pub use error::*;
pub use eval::script::{Script, Step};
