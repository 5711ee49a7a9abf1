//! Worker task: claim, resolve, fetch, record.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

use super::stats::{ItemOutcome, OutcomeKind, SkipReason};
use crate::fetch::{FetchOutcome, Fetcher, derive_filename};
use crate::resolver::Resolver;
use crate::retry::{Classify, FailureKind, RetryPolicy, run_with_retry};
use crate::store::{Item, ItemStore, StoreError};

/// Everything a worker needs, shared by the whole pool.
pub(crate) struct WorkerContext {
    pub store: Arc<dyn ItemStore>,
    pub resolver: Arc<dyn Resolver>,
    pub fetcher: Arc<dyn Fetcher>,
    pub policy: RetryPolicy,
    pub output_dir: PathBuf,
    /// Raised by the first local I/O failure; halts dispatch.
    pub abort: Arc<AtomicBool>,
}

/// Tries per outcome write while `SQLite` stays locked past its busy timeout.
const BUSY_WRITE_ATTEMPTS: u32 = 3;
const BUSY_WRITE_BACKOFF: Duration = Duration::from_millis(100);

pub(crate) type JobReceiver = Arc<Mutex<mpsc::Receiver<Item>>>;

/// Pulls items off the shared job channel until it closes.
pub(crate) async fn run_worker(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    jobs: JobReceiver,
    outcomes: mpsc::UnboundedSender<ItemOutcome>,
) {
    debug!(worker_id, "worker started");
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        let key = item.key.clone();
        let outcome = match AssertUnwindSafe(process_item(&ctx, item))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = format!("internal error: {}", panic_message(panic.as_ref()));
                error!(worker_id, key = %key, %message, "item pipeline panicked");
                let write = write_when_unlocked(&key, "record failure", || {
                    ctx.store.record_failure(&key, &message)
                });
                if let Err(e) = write.await {
                    warn!(key = %key, error = %e, "failed to record panic as failure");
                }
                ItemOutcome::failed(key, None, message)
            }
        };

        if outcomes.send(outcome).is_err() {
            break;
        }
    }
    debug!(worker_id, "worker stopped");
}

#[instrument(skip(ctx, item), fields(key = %item.key))]
async fn process_item(ctx: &WorkerContext, item: Item) -> ItemOutcome {
    if ctx.abort.load(Ordering::SeqCst) {
        return ItemOutcome::skipped(item.key, SkipReason::RunAborted);
    }

    match ctx.store.claim(&item.key).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("claim lost, skipping");
            return ItemOutcome::skipped(item.key, SkipReason::AlreadyClaimed);
        }
        Err(e) => {
            warn!(error = %e, "claim failed");
            return ItemOutcome::failed(item.key, None, format!("store error: {e}"));
        }
    }

    // A previous run may have written the file and died before recording it.
    let derived = derive_filename(&item.title, &item.file_type, &item.key);
    if non_empty_file_exists(&ctx.output_dir.join(&derived)).await {
        info!(filename = %derived, "already on disk, recording success");
        return record_success(ctx, item.key, derived, None, 0, 0).await;
    }

    let resolved = run_with_retry(&ctx.policy, "resolve", |attempt| {
        debug!(attempt, resolver = ctx.resolver.name(), "resolving");
        ctx.resolver.resolve(&item)
    })
    .await;
    let mut attempts = resolved.attempts;
    let mut retries = resolved.attempts - 1;

    let target = match resolved.result {
        Ok(target) => target,
        Err(e) => {
            let message = format!("resolve failed: {e}");
            return record_failure(ctx, item.key, e.failure_kind(), message, attempts, retries)
                .await;
        }
    };

    let filename = if is_plain_filename(&target.filename_hint) {
        target.filename_hint.clone()
    } else {
        derived
    };
    let dest = ctx.output_dir.join(&filename);

    let fetched = run_with_retry(&ctx.policy, "fetch", |attempt| {
        debug!(attempt, url = %target.url, "fetching");
        ctx.fetcher.fetch(&target, &dest)
    })
    .await;
    attempts += fetched.attempts;
    retries += fetched.attempts - 1;

    match fetched.result {
        Ok(FetchOutcome::Downloaded { bytes }) => {
            record_success(ctx, item.key, filename, Some(bytes), attempts, retries).await
        }
        Ok(FetchOutcome::AlreadyPresent { .. }) => {
            record_success(ctx, item.key, filename, None, attempts, retries).await
        }
        Err(e) => {
            let kind = e.failure_kind();
            if kind == FailureKind::LocalIo && !ctx.abort.swap(true, Ordering::SeqCst) {
                error!(error = %e, "local I/O failure, halting dispatch");
            }
            let message = format!("fetch failed: {e}");
            record_failure(ctx, item.key, kind, message, attempts, retries).await
        }
    }
}

async fn record_success(
    ctx: &WorkerContext,
    key: String,
    filename: String,
    bytes: Option<u64>,
    attempts: u32,
    retries: u32,
) -> ItemOutcome {
    let write = write_when_unlocked(&key, "record success", || {
        ctx.store.record_success(&key, &filename)
    });
    if let Err(e) = write.await {
        warn!(key = %key, error = %e, "failed to record success");
        return ItemOutcome::failed(key, None, format!("store error: {e}"))
            .with_attempts(attempts, retries);
    }
    record_attempts(ctx, &key, attempts).await;

    let kind = match bytes {
        Some(bytes) => {
            info!(key = %key, %filename, bytes, "item downloaded");
            OutcomeKind::Succeeded { filename, bytes }
        }
        None => OutcomeKind::AlreadyPresent { filename },
    };
    ItemOutcome {
        key,
        kind,
        attempts,
        retries,
    }
}

async fn record_failure(
    ctx: &WorkerContext,
    key: String,
    kind: FailureKind,
    message: String,
    attempts: u32,
    retries: u32,
) -> ItemOutcome {
    warn!(key = %key, %kind, attempts, %message, "item failed");
    let write = write_when_unlocked(&key, "record failure", || {
        ctx.store.record_failure(&key, &message)
    });
    if let Err(e) = write.await {
        warn!(key = %key, error = %e, "failed to record failure");
    }
    record_attempts(ctx, &key, attempts).await;
    ItemOutcome::failed(key, Some(kind), message).with_attempts(attempts, retries)
}

/// Runs a store write, repeating it while the database reports busy/locked.
///
/// Any other error, or a lock outlasting [`BUSY_WRITE_ATTEMPTS`], is returned.
async fn write_when_unlocked<F, Fut>(
    key: &str,
    action: &'static str,
    mut write: F,
) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Err(e) if e.is_busy_or_locked() && attempt < BUSY_WRITE_ATTEMPTS => {
                debug!(key, action, attempt, error = %e, "store busy, retrying write");
                tokio::time::sleep(BUSY_WRITE_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn record_attempts(ctx: &WorkerContext, key: &str, attempts: u32) {
    if let Err(e) = ctx.store.record_attempts(key, attempts).await {
        debug!(key, error = %e, "failed to record attempt count");
    }
}

async fn non_empty_file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// A filename that stays inside the output directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
