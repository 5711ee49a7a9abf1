//! Catalog item types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a catalog item.
///
/// `Unset` is the state the catalog source leaves rows in (stored as SQL
/// `NULL`). Both `Unset` and `Pending` are eligible for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Never touched by the engine.
    Unset,
    /// Waiting to be processed.
    Pending,
    /// Claimed by a worker.
    InProgress,
    /// Bytes are on disk and the filename is recorded.
    Success,
    /// Gave up for this run; an operator may requeue it.
    Failed,
}

impl ItemStatus {
    /// Returns the display label (`unset` for the null status).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns the stored column value; `None` for [`ItemStatus::Unset`].
    #[must_use]
    pub fn as_db(&self) -> Option<&'static str> {
        match self {
            Self::Unset => None,
            other => Some(other.as_str()),
        }
    }

    /// Parses a stored column value.
    #[must_use]
    pub fn from_db(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(Self::Unset),
            Some(s) => s.parse().ok(),
        }
    }

    /// Returns true if a worker may claim an item in this status.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Unset | Self::Pending)
    }

    /// Returns true for `success` and `failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid item status: {s}")),
        }
    }
}

/// A catalog row as delivered by the catalog source.
///
/// Field aliases accept the column names used by the scraper exports
/// (`md5`, `link`, `download_url`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    /// Content hash identifying the item.
    #[serde(alias = "md5")]
    pub key: String,
    /// Human-readable title, used to derive the filename.
    #[serde(default)]
    pub title: String,
    /// File extension without the dot (`epub`, `pdf`).
    #[serde(default, alias = "extension")]
    pub file_type: String,
    /// Lookup page link or direct download URL.
    #[serde(default, alias = "link", alias = "download_url")]
    pub raw_reference: Option<String>,
}

impl NewItem {
    /// Creates a new catalog row.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        file_type: impl Into<String>,
        raw_reference: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            file_type: file_type.into(),
            raw_reference,
        }
    }
}

/// Whether an insert created a row or merged into an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created with status unset.
    Inserted,
    /// The key already existed; catalog fields were refreshed, outcome kept.
    Merged,
}

/// A stored catalog item.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Item {
    /// Store-assigned dispatch order.
    pub seq: i64,
    /// Content hash.
    #[sqlx(rename = "item_key")]
    pub key: String,
    /// Title from the catalog.
    pub title: String,
    /// File type from the catalog.
    pub file_type: String,
    /// Lookup page or direct URL.
    pub raw_reference: Option<String>,
    /// Stored status text (`None` = unset), parsed via [`Item::status`].
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: Option<String>,
    /// Filename inside the output directory, set on success.
    pub downloaded_filename: Option<String>,
    /// Last failure message.
    pub error_message: Option<String>,
    /// Location written back by the remote-storage uploader.
    pub remote_location: Option<String>,
    /// Network attempts consumed by the most recent run.
    pub attempts: i64,
}

impl Item {
    /// Builds an unset item from a catalog row (used by the in-memory store).
    #[must_use]
    pub fn from_new(seq: i64, new: &NewItem) -> Self {
        Self {
            seq,
            key: new.key.clone(),
            title: new.title.clone(),
            file_type: new.file_type.clone(),
            raw_reference: new.raw_reference.clone(),
            status_str: None,
            downloaded_filename: None,
            error_message: None,
            remote_location: None,
            attempts: 0,
        }
    }

    /// Returns the parsed status.
    ///
    /// Unknown values written by external tools are treated as `Failed` so
    /// they are never dispatched automatically.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        ItemStatus::from_db(self.status_str.as_deref()).unwrap_or(ItemStatus::Failed)
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        self.status_str = status.as_db().map(str::to_string);
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Item {{ key: {}, title: {}, status: {} }}",
            self.key,
            self.title,
            self.status()
        )
    }
}

/// A successfully downloaded item, as consumed by the remote-storage uploader.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DownloadedItem {
    /// Content hash.
    #[sqlx(rename = "item_key")]
    pub key: String,
    /// Filename inside the output directory.
    pub downloaded_filename: String,
    /// Location reference if the uploader already ran.
    pub remote_location: Option<String>,
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub unset: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub success: u64,
    pub failed: u64,
}

impl StatusCounts {
    /// Adds `count` to the bucket for `status`.
    pub fn add(&mut self, status: ItemStatus, count: u64) {
        let bucket = match status {
            ItemStatus::Unset => &mut self.unset,
            ItemStatus::Pending => &mut self.pending,
            ItemStatus::InProgress => &mut self.in_progress,
            ItemStatus::Success => &mut self.success,
            ItemStatus::Failed => &mut self.failed,
        };
        *bucket += count;
    }

    /// Returns the count for one status.
    #[must_use]
    pub fn get(&self, status: ItemStatus) -> u64 {
        match status {
            ItemStatus::Unset => self.unset,
            ItemStatus::Pending => self.pending,
            ItemStatus::InProgress => self.in_progress,
            ItemStatus::Success => self.success,
            ItemStatus::Failed => self.failed,
        }
    }

    /// Total number of items.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.unset + self.pending + self.in_progress + self.success + self.failed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_item(status: Option<&str>) -> Item {
        let mut item = Item::from_new(
            1,
            &NewItem::new("d41d8cd98f00b204e9800998ecf8427e", "Dune", "epub", None),
        );
        item.status_str = status.map(str::to_string);
        item
    }

    #[test]
    fn test_item_status_db_mapping() {
        assert_eq!(ItemStatus::Unset.as_db(), None);
        assert_eq!(ItemStatus::InProgress.as_db(), Some("in_progress"));
        assert_eq!(ItemStatus::from_db(None), Some(ItemStatus::Unset));
        assert_eq!(ItemStatus::from_db(Some("success")), Some(ItemStatus::Success));
        assert_eq!(ItemStatus::from_db(Some("bogus")), None);
    }

    #[test]
    fn test_item_status_from_str_invalid() {
        let result = "done".parse::<ItemStatus>();
        assert!(result.unwrap_err().contains("invalid item status"));
    }

    #[test]
    fn test_item_status_dispatchable_and_terminal() {
        assert!(ItemStatus::Unset.is_dispatchable());
        assert!(ItemStatus::Pending.is_dispatchable());
        assert!(!ItemStatus::InProgress.is_dispatchable());
        assert!(ItemStatus::Success.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::Pending.is_terminal());
    }

    #[test]
    fn test_item_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ItemStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_item_status_parses_null_as_unset() {
        assert_eq!(sample_item(None).status(), ItemStatus::Unset);
        assert_eq!(sample_item(Some("pending")).status(), ItemStatus::Pending);
    }

    #[test]
    fn test_item_unknown_status_is_not_dispatchable() {
        let item = sample_item(Some("archived"));
        assert_eq!(item.status(), ItemStatus::Failed);
        assert!(!item.status().is_dispatchable());
    }

    #[test]
    fn test_new_item_accepts_scraper_aliases() {
        let row: NewItem = serde_json::from_str(
            r#"{"md5":"abc","title":"Dune","file_type":"epub","link":"https://x.test/md5/abc"}"#,
        )
        .unwrap();
        assert_eq!(row.key, "abc");
        assert_eq!(row.raw_reference.as_deref(), Some("https://x.test/md5/abc"));
    }

    #[test]
    fn test_status_counts_total() {
        let mut counts = StatusCounts::default();
        counts.add(ItemStatus::Pending, 2);
        counts.add(ItemStatus::Success, 3);
        assert_eq!(counts.get(ItemStatus::Success), 3);
        assert_eq!(counts.total(), 5);
    }
}
