//! Error types for location resolution.

use thiserror::Error;

use crate::retry::{Classify, FailureKind};

/// Errors that can occur while resolving an item to a fetch URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The lookup page has no usable link, or the host says the item is gone.
    #[error("no fetch location for item {key}: {reason}")]
    NotFound {
        /// Item key.
        key: String,
        /// What was missing.
        reason: String,
    },

    /// The lookup page could not be read right now; worth retrying.
    #[error("transient failure loading {url}: {reason}")]
    Transient {
        /// Lookup page URL.
        url: String,
        /// Timeout, connection or status detail.
        reason: String,
    },

    /// The item's reference is missing or not a usable URL.
    #[error("invalid reference for item {key}: {reason}")]
    InvalidReference {
        /// Item key.
        key: String,
        /// Why the reference was rejected.
        reason: String,
    },
}

impl ResolveError {
    #[must_use]
    pub fn not_found(key: &str, reason: impl Into<String>) -> Self {
        Self::NotFound {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn transient(url: &str, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_reference(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl Classify for ResolveError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::TransientNetwork,
            Self::NotFound { .. } | Self::InvalidReference { .. } => FailureKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::not_found("abc", "no link starting with get.php");
        assert_eq!(
            err.to_string(),
            "no fetch location for item abc: no link starting with get.php"
        );
    }

    #[test]
    fn test_resolve_error_classification() {
        assert_eq!(
            ResolveError::transient("https://x/ads.php", "HTTP 503").failure_kind(),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            ResolveError::invalid_reference("abc", "empty").failure_kind(),
            FailureKind::NotFound
        );
    }
}
