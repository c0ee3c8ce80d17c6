//! Named services operators declare in `requires`.
//!
//! Services are registered once on the [`DependencyResolver`] with a factory
//! and a [`ServiceLifetime`]. Each script invocation resolves through its own
//! [`ResolutionScope`], which carries mock substitutes and request-scoped
//! instances and is dropped with the invocation.

mod resolver;
mod scope;

pub use resolver::{DependencyResolver, ServiceDefinition, ServiceFactory, ServiceLifetime};
pub use scope::{Dependencies, ResolutionScope, ServiceHandle};
