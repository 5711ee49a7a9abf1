//! `SQLite`-backed item store.
//!
//! Every status change is a single conditional `UPDATE`; the `WHERE` clause
//! carries the expected current status, so a transition either happens
//! atomically or affects zero rows.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use super::{
    DownloadedItem, InsertOutcome, Item, ItemStatus, ItemStore, NewItem, Result, StatusCounts,
    StoreError, limit_to_i64, validate_key,
};
use crate::db::Database;

const ITEM_COLUMNS: &str = "seq, item_key, title, file_type, raw_reference, status, \
     downloaded_filename, error_message, remote_location, attempts";

/// Item store backed by the `items` table.
#[derive(Debug, Clone)]
pub struct SqliteItemStore {
    db: Database,
}

impl SqliteItemStore {
    /// Creates a store over an opened (and migrated) database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Builds the error for a conditional update that matched no row.
    async fn transition_error(&self, key: &str, action: &'static str) -> StoreError {
        match self.get(key).await {
            Ok(Some(item)) => StoreError::InvalidTransition {
                key: key.to_string(),
                status: item.status(),
                action,
            },
            Ok(None) => StoreError::ItemNotFound(key.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    #[instrument(skip(self, item), fields(key = %item.key))]
    async fn insert(&self, item: &NewItem) -> Result<InsertOutcome> {
        validate_key(&item.key)?;
        let mut tx = self.db.pool().begin().await?;

        let inserted = sqlx::query(
            r"INSERT INTO items (item_key, title, file_type, raw_reference)
              VALUES (?, ?, ?, ?)
              ON CONFLICT(item_key) DO NOTHING",
        )
        .bind(&item.key)
        .bind(&item.title)
        .bind(&item.file_type)
        .bind(item.raw_reference.as_deref())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let outcome = if inserted == 1 {
            InsertOutcome::Inserted
        } else {
            sqlx::query(
                r"UPDATE items
                  SET title = ?,
                      file_type = ?,
                      raw_reference = COALESCE(?, raw_reference),
                      updated_at = datetime('now')
                  WHERE item_key = ?",
            )
            .bind(&item.title)
            .bind(&item.file_type)
            .bind(item.raw_reference.as_deref())
            .bind(&item.key)
            .execute(&mut *tx)
            .await?;
            InsertOutcome::Merged
        };

        tx.commit().await?;
        debug!(?outcome, "catalog row stored");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE item_key = ?"
        ))
        .bind(key)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(item)
    }

    #[instrument(skip(self))]
    async fn list_pending_after(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE (status IS NULL OR status = ?) AND seq > ?
             ORDER BY seq ASC
             LIMIT ?"
        ))
        .bind(ItemStatus::Pending.as_str())
        .bind(cursor.unwrap_or(0))
        .bind(limit_to_i64(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    #[instrument(skip(self))]
    async fn claim(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r"UPDATE items
              SET status = ?, error_message = NULL, updated_at = datetime('now')
              WHERE item_key = ? AND (status IS NULL OR status = ?)",
        )
        .bind(ItemStatus::InProgress.as_str())
        .bind(key)
        .bind(ItemStatus::Pending.as_str())
        .execute(self.db.pool())
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!(claimed, "claim attempted");
        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn record_success(&self, key: &str, filename: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items
              SET status = ?,
                  downloaded_filename = ?,
                  error_message = NULL,
                  updated_at = datetime('now')
              WHERE item_key = ? AND status = ?",
        )
        .bind(ItemStatus::Success.as_str())
        .bind(filename)
        .bind(key)
        .bind(ItemStatus::InProgress.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(key, "record success for").await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_failure(&self, key: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items
              SET status = ?,
                  downloaded_filename = NULL,
                  error_message = ?,
                  updated_at = datetime('now')
              WHERE item_key = ? AND status = ?",
        )
        .bind(ItemStatus::Failed.as_str())
        .bind(message)
        .bind(key)
        .bind(ItemStatus::InProgress.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(key, "record failure for").await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_attempts(&self, key: &str, attempts: u32) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items SET attempts = ?, updated_at = datetime('now') WHERE item_key = ?",
        )
        .bind(i64::from(attempts))
        .bind(key)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ItemNotFound(key.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<Item>> {
        // `IS ?` matches NULL for the unset status and behaves like `=` otherwise.
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE status IS ? ORDER BY seq ASC"
        ))
        .bind(status.as_db())
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    #[instrument(skip(self))]
    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM items GROUP BY status")
            .fetch_all(self.db.pool())
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: Option<String> = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let status = ItemStatus::from_db(status.as_deref()).unwrap_or(ItemStatus::Failed);
            counts.add(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    #[instrument(skip(self))]
    async fn requeue(&self, key: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items SET status = ?, updated_at = datetime('now')
              WHERE item_key = ? AND status = ?",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(key)
        .bind(ItemStatus::Failed.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(key, "requeue").await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn requeue_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r"UPDATE items SET status = ?, updated_at = datetime('now') WHERE status = ?",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(ItemStatus::Failed.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn reset_in_progress(&self) -> Result<u64> {
        let result = sqlx::query(
            r"UPDATE items SET status = ?, updated_at = datetime('now') WHERE status = ?",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(ItemStatus::InProgress.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list_downloaded(&self) -> Result<Vec<DownloadedItem>> {
        let items = sqlx::query_as::<_, DownloadedItem>(
            r"SELECT item_key, downloaded_filename, remote_location
              FROM items
              WHERE status = ? AND downloaded_filename IS NOT NULL
              ORDER BY seq ASC",
        )
        .bind(ItemStatus::Success.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    #[instrument(skip(self))]
    async fn record_remote_location(&self, key: &str, location: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items SET remote_location = ?, updated_at = datetime('now')
              WHERE item_key = ? AND status = ?",
        )
        .bind(location)
        .bind(key)
        .bind(ItemStatus::Success.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(key, "record remote location for").await);
        }
        Ok(())
    }
}
