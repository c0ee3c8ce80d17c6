//! Script Evaluation
//!
//! The evaluation system runs declarative scripts: ordered steps that each
//! invoke one operator and bind its result into the next context snapshot.
//!
//! # Core Components
//!
//! ## Script
//! Steps and the operand micro-syntax ([`script::Expression`]): pointers,
//! escaped literals, plain literals and nested step trees.
//!
//! ## Context
//! Immutable variable snapshot plus the pointer root ([`context::Context`]).
//!
//! ## Evaluator
//! Drives steps turn by turn, dispatching by arity and laziness, consulting
//! the cache and resolving services ([`evaluator::Evaluator`]).
//!
//! ## Thunks and Method State
//! Deferred operands for lazy operators ([`thunk::Thunk`]) and resumable
//! progress for iterative ones ([`state::MethodState`]).
//!
//! # Evaluation Pipeline
//!
//! 1. A script and an initial context arrive from the engine facade
//! 2. Each step's operator is looked up in the catalog
//! 3. Operands are resolved or deferred, validated, and services resolved
//! 4. The operator runs, possibly over several turns, and the result is bound

pub mod context;
pub mod evaluator;
pub mod pointer;
pub mod script;
pub mod state;
pub mod thunk;
