//! Shared helpers for integration tests: stores, retry policies, mock
//! lookup pages and flaky HTTP responders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use catalog_dl::http_client::HttpTimeouts;
use catalog_dl::retry::Backoff;
use catalog_dl::{Database, HttpFetcher, NewItem, RetryPolicy, SqliteItemStore};
use tempfile::TempDir;
use wiremock::{Respond, ResponseTemplate};

/// Creates a file-backed store in a fresh temp directory.
///
/// The `TempDir` must be kept alive for the database file to remain valid.
pub async fn file_store() -> (TempDir, Arc<SqliteItemStore>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("catalog.db"))
        .await
        .expect("Failed to open database");
    (temp_dir, Arc::new(SqliteItemStore::new(db)))
}

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Backoff::Fixed,
        Duration::from_millis(50),
    )
}

/// Fetcher with a short total timeout for slow-responder tests.
pub fn fetcher_with_timeout(total: Duration) -> HttpFetcher {
    HttpFetcher::with_timeouts(
        HttpTimeouts {
            connect: Duration::from_secs(5),
            total,
        },
        None,
    )
    .expect("Failed to build fetcher")
}

pub fn item(key: &str, title: &str, file_type: &str, reference: Option<String>) -> NewItem {
    NewItem::new(key, title, file_type, reference)
}

/// A lookup page carrying one download anchor among unrelated links.
pub fn lookup_page(href: &str) -> String {
    format!(
        r#"<html><body>
        <a href="/index.php">Home</a>
        <table><tr><td><a href="{href}">GET</a></td></tr></table>
        <a href="https://mirror.test/other.php">Mirror</a>
        </body></html>"#
    )
}

/// A lookup page without any download anchor.
pub fn page_without_link() -> String {
    r#"<html><body><a href="/index.php">Home</a><p>File removed.</p></body></html>"#.to_string()
}

/// Responder that serves `failure` for the first `fail_count` requests, then
/// `success`.
pub struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    failure: ResponseTemplate,
    success: ResponseTemplate,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, failure: ResponseTemplate, success: ResponseTemplate) -> Self {
        Self {
            request_count: Arc::new(AtomicUsize::new(0)),
            fail_count,
            failure,
            success,
        }
    }

    /// Fails with HTTP 500 before succeeding with `body`.
    pub fn server_errors(fail_count: usize, body: &[u8]) -> Self {
        Self::new(
            fail_count,
            ResponseTemplate::new(500).set_body_bytes(b"internal server error".to_vec()),
            ResponseTemplate::new(200).set_body_bytes(body.to_vec()),
        )
    }

    /// Stalls for `stall` (longer than the client timeout) before succeeding.
    pub fn timeouts(fail_count: usize, stall: Duration, body: &[u8]) -> Self {
        Self::new(
            fail_count,
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .set_delay(stall),
            ResponseTemplate::new(200).set_body_bytes(body.to_vec()),
        )
    }

    /// Shared counter of requests seen by this responder.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.request_count)
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            self.failure.clone()
        } else {
            self.success.clone()
        }
    }
}

/// Lists leftover `.part` files in `dir`.
pub fn part_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("Failed to read output dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect()
}
