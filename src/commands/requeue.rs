//! Requeue command handler: operator-driven retry of failed items.

use std::path::Path;

use anyhow::{Context, Result};
use catalog_dl::ItemStore;

use crate::cli::RequeueArgs;

pub async fn run_requeue_command(db_path: &Path, args: &RequeueArgs) -> Result<()> {
    let store = super::open_store(db_path).await?;

    if let Some(key) = &args.key {
        store
            .requeue(key)
            .await
            .with_context(|| format!("Failed to requeue item '{key}'"))?;
        println!("Requeued {key}");
    } else {
        let moved = store.requeue_failed().await?;
        println!("Requeued {moved} failed item(s)");
    }
    Ok(())
}
