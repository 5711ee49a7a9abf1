//! Orchestrator driving a bounded worker pool over the item store.
//!
//! # Overview
//!
//! A run moves through [`RunPhase::Start`], [`RunPhase::Dispatching`],
//! [`RunPhase::Draining`] and [`RunPhase::Done`]. While dispatching, the
//! orchestrator pages dispatchable items out of the store with a `seq`
//! cursor and sends them into a bounded job channel. A fixed pool of worker
//! tasks takes items off that channel; each worker claims the item,
//! resolves it, fetches it under the retry policy and records the outcome.
//! Workers report an [`ItemOutcome`] per item on a result channel, which is
//! folded into the [`RunSummary`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use catalog_dl::engine::{EngineConfig, Orchestrator};
//! use catalog_dl::fetch::HttpFetcher;
//! use catalog_dl::resolver::{LinkPageConfig, LinkPageResolver};
//! use catalog_dl::store::SqliteItemStore;
//! use catalog_dl::Database;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteItemStore::new(Database::new(Path::new("catalog.db")).await?);
//! let orchestrator = Orchestrator::new(
//!     EngineConfig::default(),
//!     Arc::new(store),
//!     Arc::new(LinkPageResolver::new(LinkPageConfig::default())?),
//!     Arc::new(HttpFetcher::new()?),
//! )?;
//! let summary = orchestrator
//!     .run(Path::new("./downloads"), CancellationToken::new())
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod stats;
mod worker;

pub use stats::{ItemOutcome, OutcomeKind, RunSummary, SkipReason};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::fetch::Fetcher;
use crate::resolver::Resolver;
use crate::retry::RetryPolicy;
use crate::store::{Item, ItemStore, StoreError};
use worker::WorkerContext;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 64;

/// Default number of workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of items listed per store page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Error type for orchestrator operations.
///
/// Per-item failures never surface here; they are recorded in the store and
/// counted in the [`RunSummary`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    #[error("invalid page size {value}: must be at least 1")]
    InvalidPageSize { value: usize },

    /// Listing or recovering items failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A pool task ended abnormally.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Observable phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    Dispatching,
    Draining,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        write!(f, "{label}")
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker tasks.
    pub concurrency: usize,
    /// Items listed per store page.
    pub page_size: usize,
    /// Stop dispatching after this many items.
    pub max_items: Option<usize>,
    /// Retry policy for both the resolve and fetch phases.
    pub retry_policy: RetryPolicy,
    /// Return `in_progress` items to pending before dispatching.
    ///
    /// Off by default: another process sharing the store may hold those
    /// claims. Enable only after a crash left claims behind.
    pub recover_stale_claims: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            max_items: None,
            retry_policy: RetryPolicy::default(),
            recover_stale_claims: false,
        }
    }
}

impl EngineConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] or
    /// [`EngineError::InvalidPageSize`].
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if self.page_size == 0 {
            return Err(EngineError::InvalidPageSize {
                value: self.page_size,
            });
        }
        Ok(())
    }
}

/// How the dispatch loop ended.
#[derive(Debug, Clone, Copy, Default)]
struct DispatchEnd {
    dispatched: usize,
    cancelled: bool,
}

/// Drives one or more runs over an item store.
///
/// Runs on the same orchestrator should not overlap; the phase and progress
/// channels describe one run at a time.
pub struct Orchestrator {
    config: EngineConfig,
    store: Arc<dyn ItemStore>,
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn Fetcher>,
    phase_tx: watch::Sender<RunPhase>,
    progress_tx: watch::Sender<RunSummary>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("resolver", &self.resolver.name())
            .field("phase", &*self.phase_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`EngineConfig::validate`].
    #[instrument(level = "debug", skip_all, fields(concurrency = config.concurrency))]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ItemStore>,
        resolver: Arc<dyn Resolver>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            page_size = config.page_size,
            max_items = ?config.max_items,
            max_attempts = config.retry_policy.max_attempts(),
            resolver = resolver.name(),
            "creating orchestrator"
        );

        let (phase_tx, _) = watch::channel(RunPhase::Start);
        let (progress_tx, _) = watch::channel(RunSummary::default());
        Ok(Self {
            config,
            store,
            resolver,
            fetcher,
            phase_tx,
            progress_tx,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to phase transitions.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase_tx.subscribe()
    }

    /// Subscribes to the running summary, updated after every item.
    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<RunSummary> {
        self.progress_tx.subscribe()
    }

    fn set_phase(&self, phase: RunPhase) {
        info!(%phase, "run phase");
        self.phase_tx.send_replace(phase);
    }

    /// Processes dispatchable items until none remain, the item limit is
    /// reached, `cancel` fires, or a local I/O failure halts dispatch.
    ///
    /// Cancellation stops dispatch between items; items already handed to a
    /// worker run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if the output directory cannot be
    /// created and [`EngineError::Store`] if listing items fails. Per-item
    /// failures are counted in the summary instead.
    #[instrument(skip(self, cancel), fields(output_dir = %output_dir.display()))]
    pub async fn run(
        &self,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        self.set_phase(RunPhase::Start);
        self.progress_tx.send_replace(RunSummary::default());

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        if self.config.recover_stale_claims {
            let recovered = self.store.reset_in_progress().await?;
            if recovered > 0 {
                warn!(recovered, "returned stale in-progress claims to pending");
            }
        }

        let concurrency = self.config.concurrency;
        let (job_tx, job_rx) = mpsc::channel::<Item>(concurrency);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<ItemOutcome>();
        let abort = Arc::new(AtomicBool::new(false));

        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&self.store),
            resolver: Arc::clone(&self.resolver),
            fetcher: Arc::clone(&self.fetcher),
            policy: self.config.retry_policy.clone(),
            output_dir: output_dir.to_path_buf(),
            abort: Arc::clone(&abort),
        });

        let workers: Vec<_> = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(worker::run_worker(
                    worker_id,
                    Arc::clone(&ctx),
                    Arc::clone(&job_rx),
                    outcome_tx.clone(),
                ))
            })
            .collect();
        drop(outcome_tx);

        let progress_tx = self.progress_tx.clone();
        let aggregator = tokio::spawn(async move {
            let mut summary = RunSummary::default();
            while let Some(outcome) = outcome_rx.recv().await {
                summary.record(&outcome);
                progress_tx.send_replace(summary);
            }
            summary
        });

        self.set_phase(RunPhase::Dispatching);
        let dispatched = self.dispatch(&job_tx, &abort, &cancel).await;
        drop(job_tx);

        self.set_phase(RunPhase::Draining);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        let mut summary = aggregator.await?;

        let end = dispatched?;
        summary.cancelled = end.cancelled;
        summary.aborted = abort.load(Ordering::SeqCst);
        self.progress_tx.send_replace(summary);
        self.set_phase(RunPhase::Done);

        info!(
            dispatched = end.dispatched,
            succeeded = summary.succeeded,
            already_present = summary.already_present,
            failed = summary.failed,
            skipped = summary.skipped,
            retried = summary.retried,
            aborted = summary.aborted,
            cancelled = summary.cancelled,
            "run complete"
        );
        Ok(summary)
    }

    async fn dispatch(
        &self,
        job_tx: &mpsc::Sender<Item>,
        abort: &AtomicBool,
        cancel: &CancellationToken,
    ) -> Result<DispatchEnd, EngineError> {
        let mut end = DispatchEnd::default();
        let mut cursor: Option<i64> = None;

        loop {
            if cancel.is_cancelled() {
                info!("cancellation requested, stopping dispatch");
                end.cancelled = true;
                return Ok(end);
            }
            if abort.load(Ordering::SeqCst) {
                return Ok(end);
            }

            let mut limit = self.config.page_size;
            if let Some(max_items) = self.config.max_items {
                let remaining = max_items.saturating_sub(end.dispatched);
                if remaining == 0 {
                    debug!(max_items, "item limit reached");
                    return Ok(end);
                }
                limit = limit.min(remaining);
            }

            let page = self.store.list_pending_after(cursor, limit).await?;
            if page.is_empty() {
                return Ok(end);
            }
            cursor = page.last().map(|item| item.seq);
            debug!(count = page.len(), ?cursor, "dispatching page");

            for item in page {
                if abort.load(Ordering::SeqCst) {
                    return Ok(end);
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!("cancellation requested, stopping dispatch");
                        end.cancelled = true;
                        return Ok(end);
                    }
                    sent = job_tx.send(item) => {
                        if sent.is_err() {
                            warn!("all workers stopped, ending dispatch");
                            return Ok(end);
                        }
                        end.dispatched += 1;
                    }
                }
            }
        }
    }
}
