mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemaflow_common::{Logger, TracingLogger};
use schemaflow_config::{ENV_KEY_DSN, ENV_KEY_FILES_DIR, ENV_KEY_TABLE};
use schemaflow_db::{
    MigrationRunner, OperationRequest, RunOutcome, RunnerConfig, run_migrations_from_env,
};
use tracing::debug;

use crate::logging::{LogFormat, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "schemaflow", version)]
#[command(about = "Apply, revert and force versioned SQL schema migrations")]
struct Cli {
    /// Database DSN, e.g. sqlite://data/app.db
    #[arg(long, global = true, env = ENV_KEY_DSN)]
    dsn: Option<String>,

    /// Directory holding <version>_<title>.<up|down>.sql scripts
    #[arg(long, global = true, env = ENV_KEY_FILES_DIR)]
    files_dir: Option<PathBuf>,

    /// Table that records the version and dirty flag
    #[arg(long, global = true, env = ENV_KEY_TABLE)]
    table: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the operation named by MIGRATION_OPERATION using only environment settings
    Env,

    /// Apply all pending migrations
    Up,

    /// Roll back the most recently applied migration
    Down,

    /// Record VERSION as clean without running any script (-1 clears it)
    Force {
        #[arg(allow_negative_numbers = true)]
        version: i64,
    },

    /// Print the recorded version and dirty flag
    Version {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    // .env must be loaded before clap reads env-backed flags.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);
    if let Ok(path) = dotenv {
        debug!("loaded environment from {}", path.display());
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);

    let request = match &cli.command {
        Commands::Env => {
            let outcome = run_migrations_from_env(logger)?;
            println!("{}", describe_outcome(&outcome));
            return Ok(());
        }
        Commands::Up => OperationRequest::new("up"),
        Commands::Down => OperationRequest::new("down"),
        Commands::Force { version } => OperationRequest::force(*version),
        Commands::Version { json } => {
            let mut runner = open_runner(&cli, logger)?;
            let state = runner.version().context("reading migration version")?;
            if *json {
                println!("{}", serde_json::to_string(&state)?);
            } else {
                println!("version: {state}");
            }
            return Ok(());
        }
    };

    let mut runner = open_runner(&cli, logger)?;
    let outcome = runner.run(&request)?;
    println!("{}", describe_outcome(&outcome));

    let state = runner
        .version()
        .context("getting migration version after operation")?;
    println!("version: {state}");
    Ok(())
}

fn open_runner(cli: &Cli, logger: Arc<dyn Logger>) -> Result<MigrationRunner> {
    let dsn = cli
        .dsn
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .with_context(|| format!("missing --dsn or {ENV_KEY_DSN}"))?;

    let mut builder = RunnerConfig::builder().logger(logger);
    if let Some(dir) = &cli.files_dir {
        builder = builder.files_dir(dir.clone());
    }
    if let Some(table) = &cli.table {
        builder = builder.migrations_table(table.clone());
    }

    let runner = MigrationRunner::new(dsn, builder.build()?)?;
    Ok(runner)
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Migrated { versions } => {
            let list: Vec<String> = versions.iter().map(u64::to_string).collect();
            format!(
                "applied {} migration{}: {}",
                versions.len(),
                if versions.len() == 1 { "" } else { "s" },
                list.join(", ")
            )
        }
        RunOutcome::NoChange => "no change".to_string(),
        RunOutcome::RolledBack { from, to } => match to {
            Some(to) => format!("rolled back {from}, now at {to}"),
            None => format!("rolled back {from}, no version applied"),
        },
        RunOutcome::Forced { version } => match version {
            Some(v) => format!("forced version {v}"),
            None => "forced version cleared".to_string(),
        },
    }
}
