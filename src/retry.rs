//! Failure classification and retry/backoff decisions.
//!
//! Both the resolve phase and the fetch phase run under the same
//! [`RetryPolicy`]. Errors are classified into a [`FailureKind`]:
//! - [`FailureKind::TransientNetwork`] - retried within the run
//! - [`FailureKind::NotFound`] - terminal for the item
//! - [`FailureKind::LocalIo`] - terminal, and the run stops dispatching
//!
//! # Example
//!
//! ```
//! use catalog_dl::retry::{FailureKind, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.decide(FailureKind::TransientNetwork, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default cap on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Classification of a resolve or fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeouts, connection errors, 5xx, 408/429, truncated or empty bodies.
    TransientNetwork,
    /// The item cannot be located: no matching link, 4xx, bad reference.
    NotFound,
    /// The local filesystem rejected a write; affects every item.
    LocalIo,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TransientNetwork => "transient_network",
            Self::NotFound => "not_found",
            Self::LocalIo => "local_io",
        };
        write!(f, "{label}")
    }
}

/// Errors that can be classified for retry decisions.
pub trait Classify {
    /// Returns the failure kind of this error.
    fn failure_kind(&self) -> FailureKind;
}

/// Classifies an HTTP status returned by a lookup page or file host.
///
/// | Status | Kind |
/// |--------|------|
/// | 408, 429 | `TransientNetwork` |
/// | 5xx | `TransientNetwork` |
/// | other 4xx (incl. 401/403) | `NotFound` |
/// | anything else | `NotFound` |
#[must_use]
pub fn classify_http_status(status: u16) -> FailureKind {
    match status {
        408 | 429 | 500..=599 => FailureKind::TransientNetwork,
        _ => FailureKind::NotFound,
    }
}

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `base_delay * attempt`.
    Linear,
}

/// Decision on whether to attempt an operation again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt about to be made (1-indexed, so the first retry is 2).
        attempt: u32,
    },
    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry configuration shared by the resolve and fetch phases.
///
/// # Delay Calculation
///
/// ```text
/// fixed:  delay = min(base_delay, max_delay) + jitter
/// linear: delay = min(base_delay * attempt, max_delay) + jitter
/// ```
///
/// where `jitter` is uniform in `0..=jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff: Backoff,
    max_delay: Duration,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Fixed,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff: Backoff,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    /// Creates a policy with a custom attempt budget and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns a copy with the given upper bound on random jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Returns true if another attempt should follow the failed `attempt`.
    ///
    /// Only transient network failures are retried, and never past
    /// `max_attempts` total invocations.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        kind == FailureKind::TransientNetwork && attempt < self.max_attempts
    }

    /// Returns how long to wait after the failed `attempt` (1-indexed).
    #[must_use]
    pub fn delay_before_next_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt.max(1)),
        };
        delay.min(self.max_delay) + self.sample_jitter()
    }

    /// Returns the retry decision for a failed `attempt`, with a reason when
    /// giving up.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind != FailureKind::TransientNetwork {
            return RetryDecision::DoNotRetry {
                reason: format!("{kind} failure is not retryable"),
            };
        }

        if !self.should_retry(attempt, kind) {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_before_next_attempt(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final success value, or the error from the last attempt.
    pub result: Result<T, E>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
}

impl<T, E> Attempted<T, E> {
    /// Returns true if more than one attempt was made.
    #[must_use]
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is exhausted.
///
/// `op` receives the 1-indexed attempt number.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Attempted<T, E>
where
    E: Classify + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) => match policy.decide(error.failure_kind(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    debug!(phase = label, attempt, error = %error, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(phase = label, attempt, error = %error, %reason, "giving up");
                    return Attempted {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
            },
        }
    }
}
