//! Annotator CLI
//!
//! Entry point for the `annotator` command-line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use annotator::{
    Controller, EffectiveConfig, FileStore, ObjectKey, Overlay, ReconcileError, Reconciler,
    Settings, Shutdown,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Exit code for a reconcile that failed and would be retried.
const EXIT_RECONCILE_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "annotator")]
#[command(about = "Reconcile overlay attributes onto shared targets", version)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// tracing filter directive, applied as the highest config layer
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconcile cycle for an overlay
    Reconcile {
        /// Overlay key as scope/name
        key: String,

        /// Path to the store state file
        #[arg(long, short = 's')]
        state: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show what a reconcile cycle would do without writing
    Explain {
        /// Overlay key as scope/name
        key: String,

        #[arg(long, short = 's')]
        state: PathBuf,

        /// Output in human-readable format instead of JSON
        #[arg(long)]
        human: bool,
    },

    /// Run the controller loop against a state file
    Run {
        #[arg(long, short = 's')]
        state: PathBuf,

        /// Process everything once and exit
        #[arg(long)]
        once: bool,
    },

    /// Request deletion of an overlay
    Delete {
        /// Overlay key as scope/name
        key: String,

        #[arg(long, short = 's')]
        state: PathBuf,
    },

    /// Create an overlay or replace its attributes
    Apply {
        #[arg(long, short = 's')]
        state: PathBuf,

        /// Overlay document (JSON)
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Print the effective configuration, or one value of it
    Config {
        /// Dot-separated path, e.g. controller.workers
        key: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.log_filter.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    let settings = match config.settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings.log_filter);

    match cli.command {
        Commands::Reconcile { key, state, json } => run_reconcile(&settings, &key, &state, json),
        Commands::Explain { key, state, human } => run_explain(&settings, &key, &state, human),
        Commands::Run { state, once } => run_controller(&settings, &state, once),
        Commands::Delete { key, state } => run_delete(&key, &state),
        Commands::Apply { state, file } => run_apply(&state, &file),
        Commands::Config { key: None } => print_json(&config.to_json()),
        Commands::Config { key: Some(key) } => match config.get(&key) {
            Some(value) => print_json(&serde_json::to_string_pretty(value)),
            None => {
                eprintln!("No config value at '{}'", key);
                process::exit(1);
            }
        },
    }
}

fn load_config(
    path: Option<&Path>,
    log_filter: Option<&str>,
) -> Result<EffectiveConfig, annotator::ConfigError> {
    let user = EffectiveConfig::user_config_path();
    EffectiveConfig::build(user.as_deref(), path, EffectiveConfig::cli_overrides(log_filter))
}

/// `RUST_LOG` wins over the configured filter when set.
fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn parse_key(key: &str) -> ObjectKey {
    match key.parse() {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Invalid overlay key '{}': {}", key, e);
            process::exit(1);
        }
    }
}

fn print_json(result: &Result<String, serde_json::Error>) {
    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn exit_on_reconcile_error(key: &ObjectKey, err: &ReconcileError) -> ! {
    eprintln!("Reconcile of {} failed ({}): {}", key, err.kind(), err);
    process::exit(EXIT_RECONCILE_FAILED);
}

fn run_reconcile(settings: &Settings, key: &str, state: &Path, json_output: bool) {
    let key = parse_key(key);
    let reconciler = Reconciler::new(FileStore::new(state), settings.reconciler_config());

    match reconciler.reconcile(&key) {
        Ok(outcome) => {
            if json_output {
                print_json(&serde_json::to_string_pretty(&outcome));
            } else {
                println!("{}: {:?}", key, outcome);
            }
        }
        Err(e) => exit_on_reconcile_error(&key, &e),
    }
}

fn run_explain(settings: &Settings, key: &str, state: &Path, human: bool) {
    let key = parse_key(key);
    let reconciler = Reconciler::new(FileStore::new(state), settings.reconciler_config());

    let plan = match reconciler.plan(&key) {
        Ok(p) => p,
        Err(e) => exit_on_reconcile_error(&key, &e),
    };
    if human {
        print!("{}", plan.to_human());
    } else {
        print_json(&plan.to_json());
    }
}

fn run_controller(settings: &Settings, state: &Path, once: bool) {
    let reconciler = Reconciler::new(FileStore::new(state), settings.reconciler_config());
    let mut controller = Controller::new(reconciler, settings.controller_config());

    if once {
        let report = controller.run_once(16);
        for (key, err) in &report.failed {
            eprintln!("Reconcile of {} failed ({}): {}", key, err.kind(), err);
        }
        for key in &report.panicked {
            eprintln!("Reconcile of {} panicked", key);
        }
        println!(
            "Reconciled {} overlay(s), {} failed, {} panicked",
            report.succeeded.len(),
            report.failed.len(),
            report.panicked.len()
        );
        if report.has_failures() {
            process::exit(EXIT_RECONCILE_FAILED);
        }
        return;
    }

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.install() {
        eprintln!("Failed to install signal handler: {}", e);
        process::exit(1);
    }
    controller.run(&shutdown);
}

fn run_delete(key: &str, state: &Path) {
    let key = parse_key(key);
    match FileStore::new(state).mutate(|s| s.delete_overlay(&key)) {
        Ok(Some(_)) => println!("Deletion of {} requested; cleanup pending", key),
        Ok(None) => println!("Deleted {}", key),
        Err(e) => {
            eprintln!("Error deleting {}: {}", key, e);
            process::exit(1);
        }
    }
}

fn run_apply(state: &Path, file: &Path) {
    let contents = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    };
    let overlay: Overlay = match serde_json::from_str(&contents) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Invalid overlay document {}: {}", file.display(), e);
            process::exit(1);
        }
    };

    match FileStore::new(state).mutate(|s| s.apply_overlay(overlay)) {
        Ok(applied) => println!(
            "Applied {} (resourceVersion {})",
            applied.key(),
            applied.meta.resource_version
        ),
        Err(e) => {
            eprintln!("Error applying overlay: {}", e);
            process::exit(1);
        }
    }
}
