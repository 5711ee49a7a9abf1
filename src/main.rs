//! CLI entry point for catalog-dl.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;
mod commands;
mod config;

use cli::{Cli, Command};

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Nothing failed.
    Success,
    /// Some items completed and some failed.
    Partial,
    /// Nothing completed, the run was aborted, or the command errored.
    Failure,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = app::terminal::default_log_level(cli.quiet, cli.verbose);
    let no_color = app::terminal::no_color_env_requested() || app::terminal::is_dumb_terminal();
    app::terminal::init_tracing(default_level, no_color);
    debug!(?cli, "CLI arguments parsed");

    match run(&cli).await {
        Ok(outcome) => ExitCode::from(outcome.code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}

async fn run(cli: &Cli) -> Result<ProcessExit> {
    let loaded = config::load_config(cli.config.as_deref())?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), "loaded config file");
    }
    let db_path = app::settings::database_path(cli.database.as_deref(), &loaded.config);

    match &cli.command {
        Command::Run(args) => {
            commands::run_run_command(&db_path, &loaded.config, args, cli.quiet).await
        }
        Command::Import(args) => {
            commands::run_import_command(&db_path, args).await?;
            Ok(ProcessExit::Success)
        }
        Command::Status(args) => {
            commands::run_status_command(&db_path, args).await?;
            Ok(ProcessExit::Success)
        }
        Command::List(args) => {
            commands::run_list_command(&db_path, args).await?;
            Ok(ProcessExit::Success)
        }
        Command::Requeue(args) => {
            commands::run_requeue_command(&db_path, args).await?;
            Ok(ProcessExit::Success)
        }
    }
}
