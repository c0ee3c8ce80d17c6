use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::cache::OperatorCache;
use crate::config::EngineConfig;
use crate::dependency::{DependencyResolver, ResolutionScope, ServiceDefinition};
use crate::error::{EngineResult, InternalResult};
use crate::eval::context::Context;
use crate::eval::evaluator::Evaluator;
use crate::eval::script::Script;
use crate::operator::builtins;
use crate::operator::catalog::OperatorCatalog;
use crate::operator::schema::{BasicSchemaValidator, SchemaValidator};
use crate::persistence::{PERSISTENCE_SERVICE, Persistence, RESOURCES_SERVICE, ResourceRegistry};
use crate::transport::{self, FieldInvocation};

/// What a finished invocation hands back.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    /// The final pointer root: all bound variables, or the output of a
    /// trailing pass-through step.
    pub output: Value,
    pub context: Context,
}

/// Owns the process-wide pieces (catalog, services, cache) and runs scripts
/// against them. Cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<OperatorCatalog>,
    resolver: Arc<DependencyResolver>,
    cache: Arc<OperatorCache>,
    evaluator: Evaluator,
}

impl Engine {
    pub fn new(config: EngineConfig) -> InternalResult<Self> {
        Self::with_validator(config, Arc::new(BasicSchemaValidator::new()))
    }

    /// Fails when `config` does not pass [`EngineConfig::validate`].
    pub fn with_validator(
        config: EngineConfig,
        validator: Arc<dyn SchemaValidator>,
    ) -> InternalResult<Self> {
        config.validate()?;
        let catalog = Arc::new(OperatorCatalog::new());
        let resolver = Arc::new(DependencyResolver::new());
        let cache = Arc::new(OperatorCache::from_config(&config.cache));
        let evaluator = Evaluator::new(
            catalog.clone(),
            resolver.clone(),
            cache.clone(),
            validator,
            Arc::new(config),
        );
        Ok(Self {
            catalog,
            resolver,
            cache,
            evaluator,
        })
    }

    /// An engine with the builtin operators and the request-scoped
    /// `resources` service registered. Record operators additionally need a
    /// `persistence` service, see [`Engine::with_persistence`].
    pub fn with_builtins(config: EngineConfig) -> InternalResult<Self> {
        let engine = Self::new(config)?;
        builtins::register_builtins(&engine.catalog)?;
        engine.resolver.register(ServiceDefinition::request_scoped(
            RESOURCES_SERVICE,
            &[],
            |_| async { Ok(ResourceRegistry::new()) },
        ));
        Ok(engine)
    }

    pub fn with_persistence(self, persistence: Arc<dyn Persistence>) -> Self {
        self.resolver
            .register_instance(PERSISTENCE_SERVICE, persistence);
        self
    }

    pub fn catalog(&self) -> &Arc<OperatorCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<OperatorCache> {
        &self.cache
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &EngineConfig {
        self.evaluator.config()
    }

    pub async fn run(&self, script: &Script, input: Value) -> EngineResult<ScriptOutcome> {
        self.run_with_scope(script, input, ResolutionScope::new())
            .await
    }

    /// Runs `script` resolving services through `scope`, which may carry
    /// mock substitutes. The scope is dropped with the invocation.
    #[instrument(level = "debug", skip_all)]
    pub async fn run_with_scope(
        &self,
        script: &Script,
        input: Value,
        scope: ResolutionScope,
    ) -> EngineResult<ScriptOutcome> {
        let context = Context::new(input);
        info!(
            correlation_id = %context.correlation_id(),
            steps = script.len(),
            "running script"
        );
        let scope = Arc::new(scope);
        let context = self.evaluator.run(script, context, &scope).await?;
        Ok(ScriptOutcome {
            output: context.current_data().clone(),
            context,
        })
    }

    /// Runs the translated fields and returns an object keyed by alias.
    pub async fn run_fields(
        &self,
        fields: &[FieldInvocation],
        input: Value,
    ) -> EngineResult<ScriptOutcome> {
        let script = transport::translate(&self.catalog, fields)?;
        let outcome = self.run(&script, input).await?;
        let mut output = Map::new();
        for field in fields {
            let value = outcome
                .context
                .variable(&field.alias)
                .cloned()
                .unwrap_or(Value::Null);
            output.insert(field.alias.clone(), value);
        }
        Ok(ScriptOutcome {
            output: Value::Object(output),
            context: outcome.context,
        })
    }

    /// Parses and runs a JSON script.
    pub async fn run_json(&self, script: &str, input: Value) -> InternalResult<ScriptOutcome> {
        let script = Script::from_json_str(script)?;
        Ok(self.run(&script, input).await?)
    }
}
