//! Minimal CLI front end over the engine: load a document, run its
//! `actions_`, and print the resolved values (§6 "CLI surface").

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use specgraph::{ConfigSchema, Engine, EngineError, Environment, ProviderFn, ProviderModule, Value, Verbosity};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VerbosityArg {
    Quiet,
    Normal,
    Debug,
}

impl From<VerbosityArg> for Verbosity {
    fn from(v: VerbosityArg) -> Self {
        match v {
            VerbosityArg::Quiet => Verbosity::Quiet,
            VerbosityArg::Normal => Verbosity::Normal,
            VerbosityArg::Debug => Verbosity::Debug,
        }
    }
}

#[derive(Parser)]
#[command(name = "specgraph-cli")]
#[command(author, version, about = "Resolve and run actions from a declarative input document", long_about = None)]
struct Cli {
    /// Path to the input document (YAML or JSON).
    input: PathBuf,

    /// Directory results are written under.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Output verbosity.
    #[arg(long, value_enum, default_value = "normal")]
    verbosity: VerbosityArg,

    /// Run the resolved graph with the parallel executor.
    #[arg(long, conflicts_with = "no_parallel")]
    parallel: bool,

    /// Force the sequential executor even if the graph would parallelize.
    #[arg(long)]
    no_parallel: bool,

    /// Built-in provider modules to register in addition to the demo set, by name.
    #[arg(long = "extra-providers", value_name = "MODULE")]
    extra_providers: Vec<String>,

    /// Output formats to request (passed through to providers via the environment).
    #[arg(long = "format", value_name = "FMT")]
    formats: Vec<String>,

    /// Path to a style file passed through to providers via the environment.
    #[arg(long)]
    style: Option<PathBuf>,
}

/// Small built-in demo module registry, resolved by name for
/// `--extra-providers`: there is no dynamic plugin loading in scope,
/// so named modules are looked up here rather than loaded from disk.
fn builtin_module(name: &str) -> Option<ProviderModule> {
    match name {
        "breakfast" => Some(
            ProviderModule::new("breakfast")
                .register(ProviderFn::new("spam", vec![], |_| Ok(Value::string("spam"))))
                .register(ProviderFn::new("ham", vec![], |_| Ok(Value::string("ham")))),
        ),
        _ => None,
    }
}

fn init_tracing(verbosity: Verbosity) {
    let default_filter = match verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Normal => "info",
        Verbosity::Debug => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = Verbosity::from(cli.verbosity);
    init_tracing(verbosity);

    let mut environment = Environment::new(cli.output_dir.clone());
    environment.formats = cli.formats.clone();
    environment.style = cli.style.clone();
    environment.verbosity = verbosity;
    environment.parallel = cli.parallel && !cli.no_parallel;

    let document = match specgraph::document::load_path(&cli.input) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };

    let mut modules = Vec::new();
    for name in &cli.extra_providers {
        match builtin_module(name) {
            Some(module) => modules.push(module),
            None => tracing::warn!(module = name.as_str(), "unknown provider module, skipping"),
        }
    }

    let schema = ConfigSchema::new();
    let engine = Engine::new(schema, modules, environment);

    tokio::select! {
        joined = tokio::task::spawn_blocking(move || engine.run(document)) => {
            match joined {
                Ok(Ok(ns)) => {
                    for (key, value) in ns.root_entries() {
                        println!("{key} = {value}");
                    }
                    ExitCode::from(0)
                }
                Ok(Err(err)) => {
                    eprintln!("error: {err}");
                    ExitCode::from(1)
                }
                Err(join_err) => {
                    eprintln!("error: {}", EngineError::Join(join_err.to_string()));
                    ExitCode::from(1)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            ExitCode::from(130)
        }
    }
}
