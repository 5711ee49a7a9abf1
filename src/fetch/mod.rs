//! Streaming binary fetch with atomic placement.
//!
//! A fetch writes the response body into a hidden per-item `.part` file in
//! the destination directory, syncs it, and renames it onto the final path.
//! A reader therefore never observes a partially written file under the
//! final name, and a failed fetch leaves nothing behind.
//!
//! # Example
//!
//! ```no_run
//! use catalog_dl::fetch::{FetchTarget, Fetcher, HttpFetcher};
//! use std::path::Path;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new()?;
//! let url = Url::parse("https://example.com/get.php?md5=9b2d")?;
//! let target = FetchTarget::new("9b2d", url, "Dune.epub");
//! let outcome = fetcher.fetch(&target, Path::new("./downloads/Dune.epub")).await?;
//! println!("{} bytes", outcome.bytes());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod filename;

pub use client::HttpFetcher;
pub use error::FetchError;
pub use filename::derive_filename;
pub(crate) use filename::part_filename;

use std::path::Path;

use async_trait::async_trait;
use url::Url;

/// Where to fetch an item from and what to call it on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Item key, used to tag the temporary file.
    pub key: String,
    /// Absolute http(s) URL of the binary.
    pub url: Url,
    /// Derived filename inside the output directory.
    pub filename_hint: String,
}

impl FetchTarget {
    #[must_use]
    pub fn new(key: impl Into<String>, url: Url, filename_hint: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url,
            filename_hint: filename_hint.into(),
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes were streamed and the file was placed at the destination.
    Downloaded { bytes: u64 },
    /// A non-empty file was already at the destination; no body was kept.
    AlreadyPresent { bytes: u64 },
}

impl FetchOutcome {
    /// Size of the file now at the destination.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Downloaded { bytes } | Self::AlreadyPresent { bytes } => *bytes,
        }
    }
}

/// Retrieves an item's bytes into `dest`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `target` into `dest`. On error no file exists at `dest` that
    /// was not there before.
    async fn fetch(&self, target: &FetchTarget, dest: &Path) -> Result<FetchOutcome, FetchError>;
}
