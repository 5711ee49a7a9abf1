//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use catalog_dl::ItemStatus;
use clap::{Args, Parser, Subcommand};

use crate::config::ResolverKind;

/// Resolve, fetch and track every item of a content-addressed catalog.
///
/// Items are imported into a local `SQLite` catalog, resolved to a download
/// URL, streamed into a flat output directory and marked with their outcome
/// so the next run only touches what is left.
#[derive(Parser, Debug)]
#[command(name = "catalog-dl")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/catalog-dl/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Catalog database path (default: catalog.db)
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every pending item
    Run(RunArgs),
    /// Load catalog rows from a JSON array or JSON Lines file
    Import(ImportArgs),
    /// Show item counts per status
    Status(StatusArgs),
    /// List items, optionally filtered by status
    List(ListArgs),
    /// Move failed items back to pending
    Requeue(RequeueArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Directory fetched files are written to (default: downloads)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent workers (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Stop after dispatching this many items
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_items: Option<u64>,

    /// Attempts per phase for transient failures (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: Option<u8>,

    /// How item references are turned into download URLs
    #[arg(long, value_enum)]
    pub resolver: Option<ResolverKind>,

    /// Lookup page for items without a reference; `{key}` is substituted
    #[arg(long, value_name = "URL")]
    pub page_url_template: Option<String>,

    /// Anchor prefix marking the download link on lookup pages
    #[arg(long, value_name = "PREFIX")]
    pub link_prefix: Option<String>,

    /// Return items left `in_progress` by a crashed run to pending first
    /// (never while another run uses the catalog)
    #[arg(long)]
    pub recover_stale: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON array or JSON Lines export from the catalog scraper
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Print counts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only list items in this status (unset, pending, in_progress, success, failed)
    #[arg(long)]
    pub status: Option<ItemStatus>,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct RequeueArgs {
    /// Requeue only this item instead of every failed one
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,
}
