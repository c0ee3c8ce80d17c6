use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{EngineError, EngineResult};

/// Type-erased service instance.
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Per-invocation resolution state: mock substitutes and every instance whose
/// lifetime is bound to the invocation (request-scoped services, and
/// singletons built on top of a mock or a request-scoped service).
#[derive(Default)]
pub struct ResolutionScope {
    mocks: DashMap<String, ServiceHandle>,
    instances: DashMap<String, ServiceHandle>,
}

impl fmt::Debug for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mocks: Vec<String> = self.mocks.iter().map(|e| e.key().clone()).collect();
        let mut instances: Vec<String> =
            self.instances.iter().map(|e| e.key().clone()).collect();
        mocks.sort();
        instances.sort();
        f.debug_struct("ResolutionScope")
            .field("mocks", &mocks)
            .field("instances", &instances)
            .finish()
    }
}

impl ResolutionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitutes `value` for the service `name` within this scope only.
    pub fn with_mock<T: Send + Sync + 'static>(self, name: &str, value: T) -> Self {
        self.mocks.insert(name.to_string(), Arc::new(value));
        self
    }

    pub(crate) fn mock(&self, name: &str) -> Option<ServiceHandle> {
        self.mocks.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn instance(&self, name: &str) -> Option<ServiceHandle> {
        self.instances.get(name).map(|entry| entry.value().clone())
    }

    /// Keeps the first instance stored under `name` and returns it.
    pub(crate) fn store(&self, name: &str, handle: ServiceHandle) -> ServiceHandle {
        self.instances
            .entry(name.to_string())
            .or_insert(handle)
            .value()
            .clone()
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }
}

/// Services handed to one operator invocation, keyed by declared name.
#[derive(Clone, Default)]
pub struct Dependencies {
    services: HashMap<String, ServiceHandle>,
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        f.debug_struct("Dependencies").field("services", &names).finish()
    }
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, handle: ServiceHandle) {
        self.services.insert(name.to_string(), handle);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Typed access to a service. Services are usually registered as an `Arc`
    /// (`Arc<dyn Persistence>`, for instance), so cloning is cheap.
    pub fn get<T: Clone + 'static>(&self, name: &str) -> EngineResult<T> {
        let handle = self
            .services
            .get(name)
            .ok_or_else(|| EngineError::not_found("service", name))?;
        handle.downcast_ref::<T>().cloned().ok_or_else(|| {
            EngineError::not_found(
                "service",
                format!("{} as {}", name, std::any::type_name::<T>()),
            )
        })
    }
}
