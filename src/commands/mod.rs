//! CLI command handlers.

mod import;
mod list;
mod requeue;
mod run;
mod status;

pub use import::run_import_command;
pub use list::run_list_command;
pub use requeue::run_requeue_command;
pub use run::run_run_command;
pub use status::run_status_command;

use std::path::Path;

use anyhow::{Context, Result};
use catalog_dl::{Database, SqliteItemStore};

/// Opens the catalog at `path`, creating its parent directory if needed.
pub(crate) async fn open_store(path: &Path) -> Result<SqliteItemStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open catalog '{}'", path.display()))?;
    Ok(SqliteItemStore::new(db))
}
