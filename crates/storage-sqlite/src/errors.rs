//! Storage-specific error types for SQLite operations.
//!
//! This module provides error types that wrap Diesel-specific errors and convert
//! them to the database-agnostic error types defined in `pricecache_core`.

use diesel::result::Error as DieselError;
use pricecache_core::errors::{Error, StorageError};
use thiserror::Error;

/// Storage-specific errors that wrap Diesel and r2d2 types.
///
/// These errors are internal to the storage layer and are converted to
/// `pricecache_core::Error` before being returned to callers.
#[derive(Error, Debug)]
pub enum SqliteStorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Core error: {0}")]
    Core(Error),
}

/// Carries a job's own error through the writer's transaction unchanged.
impl From<Error> for SqliteStorageError {
    fn from(err: Error) -> Self {
        SqliteStorageError::Core(err)
    }
}

impl From<SqliteStorageError> for Error {
    fn from(err: SqliteStorageError) -> Self {
        match err {
            SqliteStorageError::ConnectionFailed(e) => classify(e.to_string()),
            SqliteStorageError::PoolError(e) => {
                Error::Storage(StorageError::PoolUnavailable(e.to_string()))
            }
            SqliteStorageError::QueryFailed(DieselError::NotFound) => {
                Error::Storage(StorageError::NotFound("Record not found".to_string()))
            }
            SqliteStorageError::QueryFailed(DieselError::DatabaseError(_, info)) => {
                classify(info.message().to_string())
            }
            SqliteStorageError::QueryFailed(e) => classify(e.to_string()),
            SqliteStorageError::MigrationFailed(e) => {
                Error::Storage(StorageError::MigrationFailed(e))
            }
            SqliteStorageError::Core(e) => e,
        }
    }
}

/// SQLite reports lock contention as `SQLITE_BUSY` / `SQLITE_LOCKED`, which
/// Diesel surfaces only through the message text.
pub fn is_busy_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("busy")
}

fn classify(message: String) -> Error {
    if is_busy_message(&message) {
        Error::Storage(StorageError::Busy(message))
    } else {
        Error::Storage(StorageError::Fault(message))
    }
}

/// Helper function to convert a Diesel Result to a core Result.
pub fn map_diesel_err<T>(result: std::result::Result<T, DieselError>) -> pricecache_core::Result<T> {
    result.map_err(|e| SqliteStorageError::from(e).into())
}

/// Extension trait for easily converting Diesel Results to core Results.
///
/// This provides a `.into_core()` method on any `Result<T, diesel::result::Error>`
/// which handles the conversion through SqliteStorageError.
pub trait IntoCore<T> {
    fn into_core(self) -> pricecache_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> pricecache_core::Result<T> {
        self.map_err(|e| SqliteStorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> pricecache_core::Result<T> {
        self.map_err(|e| SqliteStorageError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::DatabaseErrorKind;

    fn database_error(message: &str) -> DieselError {
        DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(message.to_string()))
    }

    #[test]
    fn test_locked_database_is_busy() {
        let err: Error = SqliteStorageError::from(database_error("database is locked")).into();
        assert!(matches!(err, Error::Storage(StorageError::Busy(_))));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_other_database_errors_are_faults() {
        let err: Error = SqliteStorageError::from(database_error("no such table: prices_2024")).into();
        assert!(matches!(err, Error::Storage(StorageError::Fault(_))));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = map_diesel_err::<()>(Err(DieselError::NotFound)).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotFound(_))));
    }

    #[test]
    fn test_core_error_passes_through() {
        let original = Error::Storage(StorageError::Busy("locked".to_string()));
        let err: Error = SqliteStorageError::from(original).into();
        assert!(matches!(err, Error::Storage(StorageError::Busy(m)) if m == "locked"));
    }
}
