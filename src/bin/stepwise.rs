use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use stepwise::{Engine, EngineConfig, Error, persistence::InMemoryPersistence};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the script (a JSON array of steps or {"steps": [...]})
    #[arg(short, long)]
    script: PathBuf,

    /// Path to the JSON input bound as the initial variables
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to record fixtures for the in-memory persistence service
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, default_value = "stepwise.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = if cli.config.exists() {
        EngineConfig::from_file(&cli.config)?
    } else {
        EngineConfig::default()
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let mut engine = Engine::with_builtins(config)?;
    if let Some(fixtures) = &cli.fixtures {
        let persistence = InMemoryPersistence::from_file(fixtures)?;
        engine = engine.with_persistence(Arc::new(persistence));
        debug!("fixtures loaded from {:?}", fixtures);
    }

    let script = std::fs::read_to_string(&cli.script)
        .map_err(|e| Error::internal(format!("Failed to read script file: {}", e)))?;
    let input: Value = match &cli.input {
        Some(path) => stepwise::config::from_file(path)?,
        None => Value::Object(Default::default()),
    };

    let outcome = engine.run_json(&script, input).await?;
    info!(correlation_id = %outcome.context.correlation_id(), "script completed");

    let output = serde_json::to_string_pretty(&outcome.output)
        .map_err(|e| Error::internal(format!("Failed to render output: {}", e)))?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
