//! Error types for item store operations.

use std::fmt;

use thiserror::Error;

use super::ItemStatus;

/// Structured classification for store/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// SQL protocol/driver error.
    Protocol,
    /// Unclassified database failure.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> StoreDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return StoreDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return StoreDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return StoreDbErrorKind::BusyOrLocked;
    }

    StoreDbErrorKind::Other
}

/// Errors that can occur during item store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: StoreDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No item exists with the given key.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// The requested transition is not allowed from the item's current status.
    #[error("cannot {action} item {key}: status is {status}")]
    InvalidTransition {
        /// Item key.
        key: String,
        /// Status found in the store.
        status: ItemStatus,
        /// The attempted operation (`record success`, `requeue`, ...).
        action: &'static str,
    },

    /// The item key is empty or otherwise unusable.
    #[error("invalid item key {0:?}")]
    InvalidKey(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::ItemNotFound(_) | Self::InvalidTransition { .. } | Self::InvalidKey(_) => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(StoreDbErrorKind::BusyOrLocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_database_message() {
        let err = StoreError::Database {
            kind: StoreDbErrorKind::Other,
            message: "connection failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("database error"));
        assert!(msg.contains("other"));
        assert!(msg.contains("connection failed"));
    }

    #[test]
    fn test_store_error_busy_flag() {
        let err = StoreError::Database {
            kind: StoreDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        assert!(err.is_busy_or_locked());
        assert!(!StoreError::ItemNotFound("abc".into()).is_busy_or_locked());
    }

    #[test]
    fn test_store_error_invalid_transition_message() {
        let err = StoreError::InvalidTransition {
            key: "abc".to_string(),
            status: ItemStatus::Success,
            action: "requeue",
        };
        assert_eq!(err.to_string(), "cannot requeue item abc: status is success");
    }

    #[test]
    fn test_store_error_pool_closed_kind() {
        let err = StoreError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.database_kind(), Some(StoreDbErrorKind::PoolClosed));
    }
}
