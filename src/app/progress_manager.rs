//! Progress UI (spinner) for download runs.

use std::time::Duration;

use catalog_dl::{RunPhase, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spawns the spinner when requested.
///
/// The task follows the orchestrator's progress and phase channels and
/// finishes once the phase reaches [`RunPhase::Done`] or the orchestrator
/// is dropped. Returns `None` when `use_spinner` is false.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    pending: u64,
    progress: watch::Receiver<RunSummary>,
    phase: watch::Receiver<RunPhase>,
) -> Option<JoinHandle<()>> {
    if !use_spinner {
        return None;
    }
    Some(tokio::spawn(spinner_loop(pending, progress, phase)))
}

async fn spinner_loop(
    pending: u64,
    mut progress: watch::Receiver<RunSummary>,
    mut phase: watch::Receiver<RunPhase>,
) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    loop {
        let current_phase = *phase.borrow_and_update();
        let summary = *progress.borrow_and_update();
        spinner.set_message(render_progress(&summary, pending, current_phase));
        if current_phase == RunPhase::Done {
            break;
        }
        let changed = tokio::select! {
            changed = progress.changed() => changed,
            changed = phase.changed() => changed,
        };
        if changed.is_err() {
            break;
        }
    }

    spinner.finish_and_clear();
}

/// Waits for the spinner task to stop. Returns false if it ended abnormally.
pub(crate) async fn finish_progress_ui(handle: Option<JoinHandle<()>>) -> bool {
    let Some(handle) = handle else {
        return true;
    };
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "progress task ended abnormally");
            false
        }
    }
}

/// Formats the spinner line, e.g. `[12/40] 10 ok, 2 failed (dispatching)`.
pub(crate) fn render_progress(summary: &RunSummary, pending: u64, phase: RunPhase) -> String {
    let done = summary.total();
    let total = pending.max(done);
    let mut line = format!(
        "[{done}/{total}] {} ok, {} failed",
        summary.completed(),
        summary.failed
    );
    if summary.retried > 0 {
        line.push_str(&format!(", {} retries", summary.retried));
    }
    line.push_str(&format!(" ({phase})"));
    line
}
