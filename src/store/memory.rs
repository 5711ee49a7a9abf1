//! In-process item store.
//!
//! All state sits behind one mutex, so each operation (including `claim`) is
//! a single critical section. Useful for tests and for one-shot runs that do
//! not need persistence.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    DownloadedItem, InsertOutcome, Item, ItemStatus, ItemStore, NewItem, Result, StatusCounts,
    StoreError, validate_key,
};

#[derive(Debug, Default)]
struct Inner {
    items: Vec<Item>,
    index: HashMap<String, usize>,
    next_seq: i64,
}

impl Inner {
    fn get_mut(&mut self, key: &str) -> Option<&mut Item> {
        let idx = *self.index.get(key)?;
        self.items.get_mut(idx)
    }

    /// Applies `apply` when the item is in `expected`, else reports why not.
    fn transition(
        &mut self,
        key: &str,
        expected: ItemStatus,
        action: &'static str,
        apply: impl FnOnce(&mut Item),
    ) -> Result<()> {
        let item = self
            .get_mut(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        let status = item.status();
        if status != expected {
            return Err(StoreError::InvalidTransition {
                key: key.to_string(),
                status,
                action,
            });
        }
        apply(item);
        Ok(())
    }

    fn move_all(&mut self, from: ItemStatus, to: ItemStatus) -> u64 {
        let mut moved = 0;
        for item in self.items.iter_mut().filter(|i| i.status() == from) {
            item.set_status(to);
            moved += 1;
        }
        moved
    }
}

/// Mutex-guarded item store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    inner: Mutex<Inner>,
}

impl MemoryItemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert(&self, new: &NewItem) -> Result<InsertOutcome> {
        validate_key(&new.key)?;
        let mut inner = self.lock();

        if let Some(item) = inner.get_mut(&new.key) {
            item.title.clone_from(&new.title);
            item.file_type.clone_from(&new.file_type);
            if new.raw_reference.is_some() {
                item.raw_reference.clone_from(&new.raw_reference);
            }
            return Ok(InsertOutcome::Merged);
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let idx = inner.items.len();
        inner.items.push(Item::from_new(seq, new));
        inner.index.insert(new.key.clone(), idx);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, key: &str) -> Result<Option<Item>> {
        Ok(self.lock().get_mut(key).cloned())
    }

    async fn list_pending_after(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<Item>> {
        let cursor = cursor.unwrap_or(0);
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.seq > cursor && i.status().is_dispatchable())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock();
        match inner.get_mut(key) {
            Some(item) if item.status().is_dispatchable() => {
                item.set_status(ItemStatus::InProgress);
                item.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_success(&self, key: &str, filename: &str) -> Result<()> {
        self.lock()
            .transition(key, ItemStatus::InProgress, "record success for", |item| {
                item.set_status(ItemStatus::Success);
                item.downloaded_filename = Some(filename.to_string());
                item.error_message = None;
            })
    }

    async fn record_failure(&self, key: &str, message: &str) -> Result<()> {
        self.lock()
            .transition(key, ItemStatus::InProgress, "record failure for", |item| {
                item.set_status(ItemStatus::Failed);
                item.downloaded_filename = None;
                item.error_message = Some(message.to_string());
            })
    }

    async fn record_attempts(&self, key: &str, attempts: u32) -> Result<()> {
        let mut inner = self.lock();
        let item = inner
            .get_mut(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        item.attempts = i64::from(attempts);
        Ok(())
    }

    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<Item>> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.status() == status)
            .cloned()
            .collect())
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for item in &self.lock().items {
            counts.add(item.status(), 1);
        }
        Ok(counts)
    }

    async fn requeue(&self, key: &str) -> Result<()> {
        self.lock()
            .transition(key, ItemStatus::Failed, "requeue", |item| {
                item.set_status(ItemStatus::Pending);
            })
    }

    async fn requeue_failed(&self) -> Result<u64> {
        Ok(self.lock().move_all(ItemStatus::Failed, ItemStatus::Pending))
    }

    async fn reset_in_progress(&self) -> Result<u64> {
        Ok(self
            .lock()
            .move_all(ItemStatus::InProgress, ItemStatus::Pending))
    }

    async fn list_downloaded(&self) -> Result<Vec<DownloadedItem>> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.status() == ItemStatus::Success)
            .filter_map(|i| {
                Some(DownloadedItem {
                    key: i.key.clone(),
                    downloaded_filename: i.downloaded_filename.clone()?,
                    remote_location: i.remote_location.clone(),
                })
            })
            .collect())
    }

    async fn record_remote_location(&self, key: &str, location: &str) -> Result<()> {
        self.lock().transition(
            key,
            ItemStatus::Success,
            "record remote location for",
            |item| item.remote_location = Some(location.to_string()),
        )
    }
}
