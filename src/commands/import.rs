//! Import command handler: load catalog rows into the store.

use std::path::Path;

use anyhow::{Context, Result};
use catalog_dl::import::import_file;

use crate::cli::ImportArgs;

pub async fn run_import_command(db_path: &Path, args: &ImportArgs) -> Result<()> {
    let store = super::open_store(db_path).await?;
    let report = import_file(&store, &args.file)
        .await
        .with_context(|| format!("Failed to import '{}'", args.file.display()))?;

    println!(
        "Imported {}: {} new, {} merged, {} rejected",
        args.file.display(),
        report.inserted,
        report.merged,
        report.rejected
    );
    store.database().clone().close().await;
    Ok(())
}
