//! Catalog import from scraper exports.
//!
//! Accepts either a JSON array of rows or JSON Lines (one object per line).
//! Rows are merged into the store by key, so importing the same export twice
//! is harmless.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::store::{InsertOutcome, ItemStore, NewItem, StoreError};

/// Errors that can occur while importing a catalog export.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be parsed. `line` is 1-based for JSON Lines input and
    /// 0 for a JSON array.
    #[error("invalid catalog row at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: u64,
    pub merged: u64,
    /// Rows skipped for having a blank key.
    pub rejected: u64,
}

/// Parses a JSON array or JSON Lines document into catalog rows.
///
/// # Errors
///
/// Returns [`ImportError::Json`] for the first row that fails to parse.
pub fn parse_rows(raw: &str) -> Result<Vec<NewItem>, ImportError> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|source| ImportError::Json { line: 0, source });
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ImportError::Json {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Inserts or merges `rows` into `store`.
///
/// # Errors
///
/// Returns [`ImportError::Store`] if the store rejects a write.
pub async fn import_rows(
    store: &dyn ItemStore,
    rows: &[NewItem],
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    for row in rows {
        if row.key.trim().is_empty() {
            warn!(title = %row.title, "skipping row without key");
            report.rejected += 1;
            continue;
        }
        match store.insert(row).await? {
            InsertOutcome::Inserted => report.inserted += 1,
            InsertOutcome::Merged => report.merged += 1,
        }
    }
    Ok(report)
}

/// Reads `path` and imports every row.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a write fails.
#[instrument(skip(store), fields(path = %path.display()))]
pub async fn import_file(store: &dyn ItemStore, path: &Path) -> Result<ImportReport, ImportError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let rows = parse_rows(&raw)?;
    let report = import_rows(store, &rows).await?;
    info!(
        inserted = report.inserted,
        merged = report.merged,
        rejected = report.rejected,
        "catalog imported"
    );
    Ok(report)
}
