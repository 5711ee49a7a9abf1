//! Per-item outcomes and the aggregated run summary.

use std::fmt;

use serde::Serialize;

use crate::retry::FailureKind;

/// Why a worker did not process an item it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another worker or process holds the claim, or the item is terminal.
    AlreadyClaimed,
    /// Dispatch was halted by a local I/O failure; the item stays pending.
    RunAborted,
}

/// Terminal result of one item within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Bytes were fetched and success was recorded.
    Succeeded { filename: String, bytes: u64 },
    /// The file was already on disk; success was recorded without a fetch.
    AlreadyPresent { filename: String },
    /// The item was recorded as failed (or could not be recorded at all).
    Failed {
        /// `None` for store errors and panics.
        kind: Option<FailureKind>,
        message: String,
    },
    /// The item was not processed.
    Skipped(SkipReason),
}

/// Message a worker sends for every item it receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub key: String,
    pub kind: OutcomeKind,
    /// Network attempts spent across the resolve and fetch phases.
    pub attempts: u32,
    /// Attempts beyond the first in each phase.
    pub retries: u32,
}

impl ItemOutcome {
    pub(crate) fn skipped(key: String, reason: SkipReason) -> Self {
        Self {
            key,
            kind: OutcomeKind::Skipped(reason),
            attempts: 0,
            retries: 0,
        }
    }

    pub(crate) fn failed(key: String, kind: Option<FailureKind>, message: String) -> Self {
        Self {
            key,
            kind: OutcomeKind::Failed { kind, message },
            attempts: 0,
            retries: 0,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: u32, retries: u32) -> Self {
        self.attempts = attempts;
        self.retries = retries;
        self
    }
}

/// Counts aggregated over one [`Orchestrator::run`](super::Orchestrator::run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items fetched and recorded as success.
    pub succeeded: u64,
    /// Items recorded as failed.
    pub failed: u64,
    /// Items handed to a worker but not processed.
    pub skipped: u64,
    /// Items recorded as success because the file already existed.
    pub already_present: u64,
    /// Total extra attempts spent on retries.
    pub retried: u64,
    /// Dispatch was halted by a local I/O failure.
    pub aborted: bool,
    /// Dispatch was stopped by cancellation.
    pub cancelled: bool,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: &ItemOutcome) {
        self.retried += u64::from(outcome.retries);
        match outcome.kind {
            OutcomeKind::Succeeded { .. } => self.succeeded += 1,
            OutcomeKind::AlreadyPresent { .. } => self.already_present += 1,
            OutcomeKind::Failed { .. } => self.failed += 1,
            OutcomeKind::Skipped(_) => self.skipped += 1,
        }
    }

    /// Items that ended in success, fetched or already present.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.succeeded + self.already_present
    }

    /// Items a worker received.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.completed() + self.failed + self.skipped
    }

    /// True when nothing failed and the run was neither aborted nor cancelled.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.aborted && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} failed, {} skipped, {} retries",
            self.succeeded, self.already_present, self.failed, self.skipped, self.retried
        )?;
        if self.aborted {
            write!(f, " (aborted)")?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
