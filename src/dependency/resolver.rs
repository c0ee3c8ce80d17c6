use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_recursion::async_recursion;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};

use super::scope::{Dependencies, ResolutionScope, ServiceHandle};

pub type ServiceFactory =
    Arc<dyn Fn(Dependencies) -> BoxFuture<'static, EngineResult<ServiceHandle>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceLifetime {
    /// Built once per process and shared.
    Singleton,
    /// Built once per invocation, in its [`ResolutionScope`].
    Request,
}

#[derive(Clone)]
pub struct ServiceDefinition {
    pub name: String,
    pub requires: Vec<String>,
    pub lifetime: ServiceLifetime,
    factory: ServiceFactory,
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl ServiceDefinition {
    pub fn new<T, F, Fut>(
        name: &str,
        requires: &[&str],
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        let factory: ServiceFactory = Arc::new(
            move |deps: Dependencies| -> BoxFuture<'static, EngineResult<ServiceHandle>> {
                let built = factory(deps);
                Box::pin(async move {
                    built
                        .await
                        .map(|service| Arc::new(service) as ServiceHandle)
                })
            },
        );
        Self {
            name: name.to_string(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            lifetime,
            factory,
        }
    }

    pub fn singleton<T, F, Fut>(name: &str, requires: &[&str], factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        Self::new(name, requires, ServiceLifetime::Singleton, factory)
    }

    pub fn request_scoped<T, F, Fut>(name: &str, requires: &[&str], factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        Self::new(name, requires, ServiceLifetime::Request, factory)
    }
}

/// Container for the named services operators declare in `requires`.
///
/// Singletons are constructed at most once per process through a per-name
/// `OnceCell`. A singleton whose construction touched a mock or a
/// request-scoped service is "tainted" and kept in the invocation's scope
/// instead, so the shared cache only ever holds real, process-wide instances.
#[derive(Default)]
pub struct DependencyResolver {
    definitions: DashMap<String, Arc<ServiceDefinition>>,
    singletons: DashMap<String, Arc<OnceCell<ServiceHandle>>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "debug", skip(self, definition), fields(service = %definition.name))]
    pub fn register(&self, definition: ServiceDefinition) {
        debug!(
            lifetime = %definition.lifetime,
            requires = ?definition.requires,
            "service registered"
        );
        self.singletons.remove(&definition.name);
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
    }

    /// Registers an already constructed singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, name: &str, value: T) {
        let handle: ServiceHandle = Arc::new(value);
        let prebuilt = handle.clone();
        self.register(ServiceDefinition {
            name: name.to_string(),
            requires: Vec::new(),
            lifetime: ServiceLifetime::Singleton,
            factory: Arc::new(
                move |_: Dependencies| -> BoxFuture<'static, EngineResult<ServiceHandle>> {
                    let handle = prebuilt.clone();
                    Box::pin(async move { Ok(handle) })
                },
            ),
        });
        self.singletons
            .insert(name.to_string(), Arc::new(OnceCell::new_with(Some(handle))));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Whether the shared singleton for `name` has been built.
    pub fn is_constructed(&self, name: &str) -> bool {
        self.singletons
            .get(name)
            .is_some_and(|cell| cell.initialized())
    }

    #[instrument(level = "debug", skip(self, scope))]
    pub async fn get(&self, name: &str, scope: &ResolutionScope) -> EngineResult<ServiceHandle> {
        let mut stack = Vec::new();
        let (handle, _) = self.get_inner(name, scope, &mut stack).await?;
        Ok(handle)
    }

    pub async fn resolve_all(
        &self,
        names: &[String],
        scope: &ResolutionScope,
    ) -> EngineResult<Dependencies> {
        let mut deps = Dependencies::new();
        for name in names {
            let handle = self.get(name, scope).await?;
            deps.insert(name, handle);
        }
        Ok(deps)
    }

    /// Returns the handle and whether it is bound to `scope`.
    #[async_recursion]
    async fn get_inner(
        &self,
        name: &str,
        scope: &ResolutionScope,
        stack: &mut Vec<String>,
    ) -> EngineResult<(ServiceHandle, bool)> {
        if let Some(mock) = scope.mock(name) {
            return Ok((mock, true));
        }
        if let Some(instance) = scope.instance(name) {
            return Ok((instance, true));
        }
        if let Some(handle) = self.constructed(name) {
            return Ok((handle, false));
        }
        if let Some(start) = stack.iter().position(|visited| visited == name) {
            let mut chain = stack[start..].to_vec();
            chain.push(name.to_string());
            return Err(EngineError::CyclicDependency { chain });
        }

        let definition = self
            .definitions
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("service", name))?;

        stack.push(name.to_string());
        let mut deps = Dependencies::new();
        let mut tainted = false;
        for required in &definition.requires {
            let (handle, scoped) = self.get_inner(required, scope, stack).await?;
            tainted |= scoped;
            deps.insert(required, handle);
        }
        stack.pop();

        match definition.lifetime {
            ServiceLifetime::Request => {
                let handle = (definition.factory)(deps).await?;
                debug!(service = name, "request-scoped service constructed");
                Ok((scope.store(name, handle), true))
            }
            ServiceLifetime::Singleton if tainted => {
                let handle = (definition.factory)(deps).await?;
                debug!(service = name, "singleton kept in scope");
                Ok((scope.store(name, handle), true))
            }
            ServiceLifetime::Singleton => {
                let cell = self
                    .singletons
                    .entry(name.to_string())
                    .or_default()
                    .value()
                    .clone();
                let handle = cell
                    .get_or_try_init(|| {
                        debug!(service = name, "singleton constructed");
                        (definition.factory)(deps)
                    })
                    .await?;
                Ok((handle.clone(), false))
            }
        }
    }

    fn constructed(&self, name: &str) -> Option<ServiceHandle> {
        self.singletons
            .get(name)
            .and_then(|cell| cell.get().cloned())
    }
}
