//! Bridge Runtime CLI entry point.
//!
//! Loads guest modules and calls methods on them from the command line.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_runtime_common::{ConfigFile, ModuleSpec, Params};
use bridge_runtime_host::HostRuntime;

#[derive(Parser)]
#[command(name = "bridge-runtime")]
#[command(author, version, about = "Call methods on sandboxed WebAssembly guests", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BRIDGE_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    /// Guest to load, as NAME=PATH (repeatable)
    #[arg(short, long = "module", value_name = "NAME=PATH")]
    modules: Vec<ModuleSpec>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method on a loaded guest and print the result
    Call {
        /// Module name
        module: String,

        /// Method name
        method: String,

        /// Parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// List loaded modules
    Modules,

    /// List registered host functions
    Builtins,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bridge_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let mut runtime = HostRuntime::with_defaults(file.runtime).context("Failed to create runtime")?;
    runtime.init().context("Failed to initialize runtime")?;

    for spec in file.modules.iter().chain(&cli.modules) {
        let bytes = std::fs::read(&spec.path)
            .with_context(|| format!("Failed to read module '{}' from {}", spec.name, spec.path))?;
        runtime
            .load_module(&spec.name, &bytes)
            .await
            .with_context(|| format!("Failed to load module '{}'", spec.name))?;
    }

    info!(modules = ?runtime.list_modules(), "Runtime ready");

    match cli.command {
        Commands::Call {
            module,
            method,
            params,
        } => {
            let params = params.as_deref().map(parse_params).transpose()?;
            let result = runtime
                .call(&module, &method, params)
                .await
                .with_context(|| format!("Call to {module}.{method} failed"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Modules => {
            for name in runtime.list_modules() {
                println!("{name}");
            }
        }
        Commands::Builtins => {
            for name in runtime.list_builtins() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn parse_params(raw: &str) -> anyhow::Result<Params> {
    match serde_json::from_str(raw).context("--params is not valid JSON")? {
        Value::Object(params) => Ok(params),
        other => bail!("--params must be a JSON object, got {other}"),
    }
}
