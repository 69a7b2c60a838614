// forge-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Driver-facing error enum and its conversion to the
//              backend-agnostic forge_core store errors.
// Dependencies: rusqlite, thiserror, forge-core
// ============================================================================

use forge_core::interfaces::ObjectStoreError;
use forge_core::interfaces::StoreError;
use thiserror::Error;

/// Errors specific to the SQLite-backed store, before they are narrowed to
/// [`StoreError`] at the trait boundary.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The underlying `rusqlite` call failed.
    #[error("sqlite error: {0}")]
    Driver(#[from] rusqlite::Error),
    /// A row a caller expects to exist was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A unique index rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// A status transition the domain state machine rejects.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// A row read back from SQLite failed to deserialize.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The blocking database task panicked or was cancelled.
    #[error("database task join error: {0}")]
    Join(String),
}

impl SqliteStoreError {
    /// Classifies a raw [`rusqlite::Error`] as a constraint violation when
    /// SQLite reports one, otherwise wraps it as a driver error.
    #[must_use]
    pub fn from_write(error: rusqlite::Error, context: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref sqlite_error, ref message) = error {
            if sqlite_error.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = message.clone().unwrap_or_default();
                return Self::Constraint(format!("{context}: {detail}"));
            }
        }
        Self::Driver(error)
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Constraint(message) => Self::Constraint(message),
            SqliteStoreError::InvalidTransition(message) => Self::InvalidTransition(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Driver(driver_error) => Self::Io(driver_error.to_string()),
            SqliteStoreError::Join(message) => Self::Io(message),
        }
    }
}

impl From<SqliteStoreError> for ObjectStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::NotFound(message) => Self::Io(message),
            other => Self::Io(other.to_string()),
        }
    }
}
