//! Exit code logic for the catalog-dl process.
//!
//! Maps a run summary to the process exit outcome.

use catalog_dl::RunSummary;

use crate::ProcessExit;

/// Determines the process exit outcome from a run summary.
///
/// An aborted run (the output directory stopped accepting writes) is a
/// failure even when some items completed first.
pub(crate) fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.aborted {
        return ProcessExit::Failure;
    }
    if summary.failed == 0 {
        ProcessExit::Success
    } else if summary.completed() > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
