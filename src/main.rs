//! d1flow - Main entry point
//!
//! Wires configuration, logging and process cleanup to one of the front ends.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use d1flow::cli::{Cli, Commands};
use d1flow::config::{WorkbenchConfig, fetch_config};
use d1flow::engine::session::Session;
use d1flow::engine::state::WorkflowState;
use d1flow::engine::steps::steps_summary;
use d1flow::executor::Controller;
use d1flow::interactive::Interactive;
use d1flow::process_guard::{self, ProcessGuard};
use d1flow::runner::{CommandRunner, ShellRunner};
use d1flow::server::{self, ServerState};

/// Initialize the tracing subscriber. Logs go to stderr so command output on
/// stdout stays clean; `RUST_LOG` overrides the default `info` level.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logger();
    info!("d1flow starting up");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    let config = session_config(&cli);
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());

    match cli.command {
        Some(Commands::Steps {
            migration_name,
            artifact,
            json,
        }) => {
            let state = seed_state(&config, migration_name, artifact);
            let steps = Session::new(state).steps();
            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else {
                println!("{}", steps_summary(&steps));
            }
        }
        Some(Commands::Run {
            step,
            migration_name,
            artifact,
        }) => {
            let state = seed_state(&config, migration_name, artifact);
            let ok = run_single_step(Session::new(state), runner, step)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { bind }) => {
            let addr = bind.unwrap_or_else(|| config.bind.clone());
            let state = ServerState::new(Session::from_config(&config), runner);
            let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            rt.block_on(server::serve(&addr, state))?;
        }
        Some(Commands::Interactive) | None => {
            let controller = Controller::new(Session::from_config(&config), runner);
            let stdin = io::stdin();
            let mut repl = Interactive::new(controller, stdin.lock(), io::stdout());
            repl.run()?;
        }
        Some(Commands::Validate { config }) => validate_config(&config)?,
    }

    Ok(())
}

/// Fetch config, then let command-line flags win.
fn session_config(cli: &Cli) -> WorkbenchConfig {
    let mut config = fetch_config(cli.config.as_deref());
    if let Some(dir) = &cli.workdir {
        config.working_directory = dir.clone();
    }
    if let Some(db) = &cli.database {
        config.database_name = db.clone();
    }
    if config.database_name.is_empty() {
        warn!("No database name configured; commands will render without one");
    }
    config
}

fn seed_state(
    config: &WorkbenchConfig,
    migration_name: Option<String>,
    artifact: Option<String>,
) -> WorkflowState {
    let mut state = WorkflowState::from_config(config);
    if let Some(name) = migration_name {
        state.set_migration_name(name);
    }
    match artifact {
        Some(file) => state.with_artifact(file),
        None => state,
    }
}

/// Run step `number` (1-based) to completion. Returns whether it succeeded.
fn run_single_step(session: Session, runner: Arc<dyn CommandRunner>, number: usize) -> Result<bool> {
    let mut controller = Controller::new(session, runner);
    let index = number
        .checked_sub(1)
        .with_context(|| format!("Steps are numbered from 1, got {}", number))?;
    controller.dispatch_step(index)?;
    let outcome = controller.wait()?;

    let mut stdout = io::stdout();
    write!(stdout, "{}", outcome.result.output)?;
    if let Some(file) = &outcome.new_artifact {
        info!("Pass --artifact {} to later steps", file);
    }
    if !outcome.result.succeeded {
        error!("Step {} failed", number);
    }
    Ok(outcome.result.succeeded)
}

fn validate_config(path: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", path);
    let config = WorkbenchConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            println!("✓ Configuration file is valid: {:?}", path);
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}
