//! Run command handler: drive the orchestrator over the catalog.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_dl::{
    DirectResolver, Fetcher, HttpFetcher, ItemStatus, ItemStore, LinkPageResolver, Orchestrator,
    Resolver,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::settings::{RunSettings, resolve_run_settings};
use crate::app::{exit_handler, progress_manager, terminal};
use crate::cli::RunArgs;
use crate::config::{FileConfig, ResolverKind};

pub async fn run_run_command(
    db_path: &Path,
    file_config: &FileConfig,
    args: &RunArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let settings = resolve_run_settings(file_config, args)?;
    let store = Arc::new(super::open_store(db_path).await?);

    let counts = store.status_counts().await?;
    let mut dispatchable = counts.get(ItemStatus::Unset) + counts.get(ItemStatus::Pending);
    if settings.engine.recover_stale_claims {
        dispatchable += counts.get(ItemStatus::InProgress);
    }
    if let Some(max_items) = settings.engine.max_items {
        dispatchable = dispatchable.min(u64::try_from(max_items).unwrap_or(u64::MAX));
    }
    info!(
        database = %db_path.display(),
        output_dir = %settings.output_dir.display(),
        dispatchable,
        "starting run"
    );

    let orchestrator = Orchestrator::new(
        settings.engine.clone(),
        Arc::clone(&store) as Arc<dyn ItemStore>,
        build_resolver(&settings)?,
        build_fetcher(&settings)?,
    )?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight items");
            signal_cancel.cancel();
        }
    });

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let progress_handle = progress_manager::spawn_progress_ui(
        use_spinner,
        dispatchable,
        orchestrator.subscribe_progress(),
        orchestrator.subscribe_phase(),
    );

    let result = orchestrator
        .run(&settings.output_dir, cancel)
        .await
        .context("Run failed");
    drop(orchestrator);
    progress_manager::finish_progress_ui(progress_handle).await;
    let summary = result?;

    if !quiet {
        println!("{summary}");
    }
    if summary.aborted {
        warn!(
            output_dir = %settings.output_dir.display(),
            "run aborted: output directory rejected a write"
        );
    }
    store.database().clone().close().await;

    Ok(exit_handler::determine_exit_outcome(&summary))
}

fn build_resolver(settings: &RunSettings) -> Result<Arc<dyn Resolver>> {
    Ok(match settings.resolver {
        ResolverKind::LinkPage => Arc::new(
            LinkPageResolver::new(settings.link_page.clone())
                .context("Failed to build lookup page HTTP client")?,
        ),
        ResolverKind::Direct => Arc::new(DirectResolver::new()),
    })
}

fn build_fetcher(settings: &RunSettings) -> Result<Arc<dyn Fetcher>> {
    let fetcher =
        HttpFetcher::with_timeouts(settings.fetch_timeouts, settings.user_agent.as_deref())
            .context("Failed to build download HTTP client")?;
    Ok(Arc::new(fetcher))
}
