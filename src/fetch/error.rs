//! Error types for the fetch module.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::{Classify, FailureKind, classify_http_status};

/// Errors that can occur while fetching an item's bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, reset, DNS or body read failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Connect or total request timeout elapsed.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The server answered 2xx with no bytes.
    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    /// Creating, writing, syncing or renaming a local file failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fetch target is not an http(s) URL.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Creates a network error, mapping reqwest timeouts to [`FetchError::Timeout`].
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::EmptyBody { .. } => {
                FailureKind::TransientNetwork
            }
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            Self::Io { .. } => FailureKind::LocalIo,
            Self::InvalidUrl { .. } => FailureKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_http_status_display() {
        let error = FetchError::http_status("https://example.com/get.php?md5=abc", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(msg.contains("get.php"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_fetch_error_classification() {
        assert_eq!(
            FetchError::http_status("u", 404).failure_kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            FetchError::http_status("u", 502).failure_kind(),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            FetchError::Timeout { url: "u".into() }.failure_kind(),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            FetchError::EmptyBody { url: "u".into() }.failure_kind(),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            FetchError::invalid_url("ftp://x").failure_kind(),
            FailureKind::NotFound
        );
    }

    #[test]
    fn test_fetch_error_io_is_local() {
        let error = FetchError::io(
            "/readonly/file.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.failure_kind(), FailureKind::LocalIo);
        assert!(error.to_string().contains("/readonly/file.pdf"));
    }
}
