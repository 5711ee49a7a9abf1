//! Binary-side helpers: settings resolution, progress UI and exit codes.

pub(crate) mod exit_handler;
pub(crate) mod progress_manager;
pub(crate) mod settings;
pub(crate) mod terminal;
