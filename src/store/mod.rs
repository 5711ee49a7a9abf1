//! Item store: the durable catalog and the per-item status machine.
//!
//! The store is the single resource shared by all workers of a run. Every
//! implementation must make [`ItemStore::claim`] a single atomic
//! check-and-set so that two workers racing on the same key can never both
//! win.
//!
//! # Overview
//!
//! - [`ItemStore`] - async contract used by the engine and the CLI
//! - [`SqliteItemStore`] - `SQLite`-backed store (multi-process safe)
//! - [`MemoryItemStore`] - mutex-guarded in-process store
//! - [`Item`] / [`ItemStatus`] - stored rows and their lifecycle
//!
//! # Example
//!
//! ```no_run
//! use catalog_dl::store::{ItemStore, NewItem, SqliteItemStore};
//! use catalog_dl::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteItemStore::new(Database::new(Path::new("catalog.db")).await?);
//! store.insert(&NewItem::new("9b2d", "Dune", "epub", None)).await?;
//!
//! for item in store.list_pending(10).await? {
//!     if store.claim(&item.key).await? {
//!         // ... resolve and fetch ...
//!         store.record_success(&item.key, "Dune.epub").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod memory;
mod sqlite;

pub use error::{StoreDbErrorKind, StoreError};
pub use item::{DownloadedItem, InsertOutcome, Item, ItemStatus, NewItem, StatusCounts};
pub use memory::MemoryItemStore;
pub use sqlite::SqliteItemStore;

use async_trait::async_trait;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Data-access contract for the catalog.
///
/// All methods are safe to call concurrently from many workers.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Inserts a catalog row, merging into an existing row with the same key.
    ///
    /// A merge refreshes title, type and reference but never touches status,
    /// filename or error fields.
    async fn insert(&self, item: &NewItem) -> Result<InsertOutcome>;

    /// Returns the item with the given key.
    async fn get(&self, key: &str) -> Result<Option<Item>>;

    /// Returns up to `limit` dispatchable (unset or pending) items in store order.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Item>> {
        self.list_pending_after(None, limit).await
    }

    /// Like [`list_pending`](Self::list_pending) but only items whose `seq` is
    /// greater than `cursor`. Used to page through a run without re-listing
    /// items already handed to workers.
    async fn list_pending_after(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<Item>>;

    /// Atomically moves a dispatchable item to `in_progress`.
    ///
    /// Returns `false` when the item is already claimed, terminal, or unknown.
    async fn claim(&self, key: &str) -> Result<bool>;

    /// Marks a claimed item successful and stores its filename in one update.
    async fn record_success(&self, key: &str, filename: &str) -> Result<()>;

    /// Marks a claimed item failed with a human-readable message.
    async fn record_failure(&self, key: &str, message: &str) -> Result<()>;

    /// Stores the number of network attempts the last run spent on an item.
    async fn record_attempts(&self, key: &str, attempts: u32) -> Result<()>;

    /// Returns all items in `status`, in store order.
    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<Item>>;

    /// Returns item counts per status.
    async fn status_counts(&self) -> Result<StatusCounts>;

    /// Returns the number of items in `status`.
    async fn count_by_status(&self, status: ItemStatus) -> Result<u64> {
        Ok(self.status_counts().await?.get(status))
    }

    /// Operator action: moves one failed item back to pending.
    async fn requeue(&self, key: &str) -> Result<()>;

    /// Operator action: moves every failed item back to pending.
    async fn requeue_failed(&self) -> Result<u64>;

    /// Returns claims abandoned by a crashed process to pending.
    ///
    /// Only safe when no other process is running against the same store.
    async fn reset_in_progress(&self) -> Result<u64>;

    /// Returns `{key, filename}` for every successful item (uploader input).
    async fn list_downloaded(&self) -> Result<Vec<DownloadedItem>>;

    /// Stores the remote location written back by the uploader.
    async fn record_remote_location(&self, key: &str, location: &str) -> Result<()>;
}

pub(crate) fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
