//! Integration tests for the item stores against a real `SQLite` file.
//!
//! Covers persistence across reopen, the claim race between many workers and
//! the operator recovery actions.

use std::collections::HashMap;
use std::sync::Arc;

use catalog_dl::store::InsertOutcome;
use catalog_dl::{
    Database, ItemStatus, ItemStore, MemoryItemStore, SqliteItemStore, StoreError,
};
use tempfile::TempDir;
use tokio::sync::Barrier;

mod support;
use support::{file_store, item};

const KEYS: [&str; 4] = ["k1", "k2", "k3", "k4"];
const WORKERS: usize = 8;

/// Every worker tries every key; returns the number of winning claims per key.
async fn race_claims(store: Arc<dyn ItemStore>) -> HashMap<String, usize> {
    let barrier = Arc::new(Barrier::new(WORKERS));
    let mut handles = Vec::with_capacity(WORKERS);
    for worker in 0..WORKERS {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut won = Vec::new();
            // Stagger the starting key so workers collide on different rows.
            for offset in 0..KEYS.len() {
                let key = KEYS[(worker + offset) % KEYS.len()];
                if store.claim(key).await.unwrap() {
                    won.push(key.to_string());
                }
            }
            won
        }));
    }

    let mut wins: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        for key in handle.await.unwrap() {
            *wins.entry(key).or_default() += 1;
        }
    }
    wins
}

async fn seed(store: &dyn ItemStore) {
    for key in KEYS {
        store.insert(&item(key, key, "pdf", None)).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_claim_race_has_exactly_one_winner_per_key() {
    let (_dir, store) = file_store().await;
    seed(store.as_ref()).await;

    let wins = race_claims(store.clone()).await;

    for key in KEYS {
        assert_eq!(wins.get(key), Some(&1), "key {key} must be claimed exactly once");
    }
    assert_eq!(
        store.count_by_status(ItemStatus::InProgress).await.unwrap(),
        KEYS.len() as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_claim_race_has_exactly_one_winner_per_key() {
    let store = Arc::new(MemoryItemStore::new());
    seed(store.as_ref()).await;

    let wins = race_claims(store.clone()).await;

    for key in KEYS {
        assert_eq!(wins.get(key), Some(&1), "key {key} must be claimed exactly once");
    }
}

#[tokio::test]
async fn test_outcomes_persist_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("catalog.db");

    {
        let store = SqliteItemStore::new(Database::new(&db_path).await.unwrap());
        store
            .insert(&item("ok", "Dune", "epub", Some("https://x/1".into())))
            .await
            .unwrap();
        store.insert(&item("bad", "Gone", "pdf", None)).await.unwrap();
        assert!(store.claim("ok").await.unwrap());
        store.record_success("ok", "Dune.epub").await.unwrap();
        assert!(store.claim("bad").await.unwrap());
        store.record_failure("bad", "fetch failed: HTTP 404").await.unwrap();
        store.database().clone().close().await;
    }

    let store = SqliteItemStore::new(Database::new(&db_path).await.unwrap());
    let ok = store.get("ok").await.unwrap().unwrap();
    assert_eq!(ok.status(), ItemStatus::Success);
    assert_eq!(ok.downloaded_filename.as_deref(), Some("Dune.epub"));

    let bad = store.get("bad").await.unwrap().unwrap();
    assert_eq!(bad.status(), ItemStatus::Failed);
    assert_eq!(bad.error_message.as_deref(), Some("fetch failed: HTTP 404"));

    assert!(store.list_pending(10).await.unwrap().is_empty());
    assert!(store.database().is_wal_enabled().await.unwrap());
}

#[tokio::test]
async fn test_reimport_keeps_success_and_refreshes_catalog_fields() {
    let (_dir, store) = file_store().await;
    store.insert(&item("k1", "Dune", "epub", None)).await.unwrap();
    store.claim("k1").await.unwrap();
    store.record_success("k1", "Dune.epub").await.unwrap();

    let outcome = store
        .insert(&item("k1", "Dune (2nd ed.)", "epub", Some("https://x/k1".into())))
        .await
        .unwrap();

    assert_eq!(outcome, InsertOutcome::Merged);
    let stored = store.get("k1").await.unwrap().unwrap();
    assert_eq!(stored.title, "Dune (2nd ed.)");
    assert_eq!(stored.raw_reference.as_deref(), Some("https://x/k1"));
    assert_eq!(stored.status(), ItemStatus::Success);
    assert_eq!(stored.downloaded_filename.as_deref(), Some("Dune.epub"));
}

#[tokio::test]
async fn test_stale_claims_and_failures_are_recoverable() {
    let (_dir, store) = file_store().await;
    for key in KEYS {
        store.insert(&item(key, key, "pdf", None)).await.unwrap();
    }
    store.claim("k1").await.unwrap();
    store.claim("k2").await.unwrap();
    store.record_failure("k2", "resolve failed: no link").await.unwrap();

    assert_eq!(store.reset_in_progress().await.unwrap(), 1);
    assert_eq!(store.requeue_failed().await.unwrap(), 1);

    let pending = store.list_pending(10).await.unwrap();
    let keys: Vec<&str> = pending.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, KEYS);
}

#[tokio::test]
async fn test_uploader_round_trip() {
    let (_dir, store) = file_store().await;
    store.insert(&item("k1", "Dune", "epub", None)).await.unwrap();
    store.insert(&item("k2", "Emma", "pdf", None)).await.unwrap();
    store.claim("k1").await.unwrap();
    store.record_success("k1", "Dune.epub").await.unwrap();

    let downloaded = store.list_downloaded().await.unwrap();
    assert_eq!(downloaded.len(), 1);
    assert_eq!(downloaded[0].key, "k1");
    assert_eq!(downloaded[0].downloaded_filename, "Dune.epub");
    assert!(downloaded[0].remote_location.is_none());

    store
        .record_remote_location("k1", "s3://bucket/Dune.epub")
        .await
        .unwrap();
    let downloaded = store.list_downloaded().await.unwrap();
    assert_eq!(
        downloaded[0].remote_location.as_deref(),
        Some("s3://bucket/Dune.epub")
    );

    let err = store
        .record_remote_location("k2", "s3://bucket/Emma.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}
