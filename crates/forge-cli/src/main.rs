// forge-cli/src/main.rs
// ============================================================================
// Module: Forge CLI Entry Point
// Description: Command dispatcher wiring configuration into the composition
//              root, then either serving the HTTP API and beat loop or
//              running a one-shot utility command.
// Dependencies: clap, tokio, tracing-subscriber
// ============================================================================

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::use_debug,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "test assertions favor directness over production error discipline"
    )
)]

mod app;
mod beat;
mod broker;
mod error;
mod functions;
mod procedures;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use forge_config::Config;
use forge_core::ids::OrganizationId;
use forge_core::ids::RunId;

use crate::error::CliError;
use crate::error::CliResult;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "forge", about = "Multi-tenant document ingestion and workflow platform")]
struct Cli {
    /// Path to the YAML configuration file (defaults to `FORGE_CONFIG`, then `./forge.yaml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the SQLite database file.
    #[arg(long, global = true, default_value = "forge.sqlite3")]
    db: PathBuf,
    /// Directory of procedure YAML definitions.
    #[arg(long, global = true, default_value = "procedures")]
    procedures_dir: PathBuf,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the HTTP API and the periodic beat loop until signalled to stop.
    Serve {
        /// Address the HTTP API binds to.
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Seconds between beat ticks.
        #[arg(long, default_value_t = 30)]
        beat_interval_seconds: u64,
    },
    /// Event-bus utilities.
    Events {
        /// Selected events subcommand.
        #[command(subcommand)]
        command: EventsCommand,
    },
}

/// Subcommands under `events`.
#[derive(Subcommand, Debug)]
enum EventsCommand {
    /// Emits an event for a tenant, firing any matching procedure triggers.
    Emit {
        /// Tenant the event belongs to.
        #[arg(long)]
        organization_id: OrganizationId,
        /// Event name matched against active `event` triggers.
        #[arg(long)]
        event_name: String,
        /// JSON payload matched against each trigger's event filter.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Run this event is attributed to, if any.
        #[arg(long)]
        source_run_id: Option<RunId>,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning a process exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    match run().await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "forge exited with an error");
            ExitCode::FAILURE
        }
    }
}

/// Parses arguments and dispatches to the selected subcommand.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, beat_interval_seconds } => command_serve(&config, &cli.db, &cli.procedures_dir, bind, beat_interval_seconds).await,
        Commands::Events { command } => command_events(&config, &cli.db, &cli.procedures_dir, command).await,
    }
}

/// Builds the application, then serves the HTTP API while the beat loop
/// runs alongside it on its own spawned task.
async fn command_serve(config: &Config, db: &PathBuf, procedures_dir: &PathBuf, bind: SocketAddr, beat_interval_seconds: u64) -> CliResult<ExitCode> {
    let app = app::build(config, db, procedures_dir).await?;

    tokio::spawn(beat::run(
        app.task_dispatcher,
        app.extraction_queue,
        app.store,
        Duration::from_secs(beat_interval_seconds),
    ));

    let router = forge_server::build_router(app.state);
    forge_server::serve(router, bind).await?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the application just far enough to run one `events` subcommand.
async fn command_events(config: &Config, db: &PathBuf, procedures_dir: &PathBuf, command: EventsCommand) -> CliResult<ExitCode> {
    let app = app::build(config, db, procedures_dir).await?;

    match command {
        EventsCommand::Emit { organization_id, event_name, payload, source_run_id } => {
            let payload: serde_json::Value = serde_json::from_str(&payload).map_err(|error| CliError::Procedures(format!("invalid --payload JSON: {error}")))?;
            let outcome = app
                .event_bus
                .emit(organization_id, &event_name, payload, source_run_id, chrono::Utc::now())
                .await
                .map_err(|error| CliError::Procedures(error.to_string()))?;
            tracing::info!(procedures_triggered = outcome.procedures_triggered.len(), "event emitted");
            Ok(ExitCode::SUCCESS)
        }
    }
}
