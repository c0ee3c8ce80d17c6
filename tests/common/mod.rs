#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use stepwise::operator::definition::{CachePolicy, OperatorDecl};
use stepwise::operator::operator::{Operator, OperatorCall, OperatorOutput};
use stepwise::{Engine, EngineConfig, EngineResult};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Returns its input (or `true` when nullary) and counts executions.
pub struct Counting {
    pub calls: Arc<AtomicUsize>,
}

pub fn counting() -> (Arc<Counting>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let operator = Arc::new(Counting {
        calls: calls.clone(),
    });
    (operator, calls)
}

#[async_trait]
impl Operator for Counting {
    async fn execute(&self, call: OperatorCall<'_>) -> EngineResult<OperatorOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = match call.input() {
            Ok(input) => input.resolve().await?,
            Err(_) => Value::Bool(true),
        };
        Ok(OperatorOutput::Ready(value))
    }
}

pub fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    Engine::with_builtins(config).expect("builtins register")
}

/// Registers a unary counting operator under `name` with `policy`.
pub fn register_counting(engine: &Engine, name: &str, policy: CachePolicy) -> Arc<AtomicUsize> {
    let (operator, calls) = counting();
    engine
        .catalog()
        .register(
            OperatorDecl::new(name)
                .unary(serde_json::json!({}))
                .cache(policy),
            operator,
        )
        .expect("counting operator registers");
    calls
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
