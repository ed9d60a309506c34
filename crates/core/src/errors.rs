//! Core error types for the price cache.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, r2d2) are converted to these types by the storage layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use pricecache_market_data::UpstreamError;
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the price cache.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream fetch failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Trading calendar error: {0}")]
    Calendar(String),

    #[error("Invalid configuration value: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Returns true for storage failures that must abort the current run.
    ///
    /// Busy conditions are retried inside the store and never reach callers
    /// as `Busy`; whatever storage error escapes is terminal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(e) if !e.is_busy())
    }
}

/// Storage-agnostic error type for store operations.
///
/// Details are carried as strings so the storage layer can convert its own
/// errors without leaking driver types into the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The database is locked by another writer. Retried with backoff.
    #[error("Storage busy: {0}")]
    Busy(String),

    /// Any other storage failure. Fatal to the calling operation.
    #[error("Storage fault: {0}")]
    Fault(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Schema migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// No pooled connection could be obtained.
    #[error("Connection pool unavailable: {0}")]
    PoolUnavailable(String),
}

impl StorageError {
    /// Returns true for lock contention that clears on its own.
    pub fn is_busy(&self) -> bool {
        matches!(self, StorageError::Busy(_))
    }
}

/// Validation errors for input and fetched data.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid price point for {symbol} on {date}: {reason}")]
    InvalidPricePoint {
        symbol: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}
