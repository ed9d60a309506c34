//! SQLite storage implementation for the price cache.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the store traits defined in `pricecache-core` and contains:
//! - Database connection pooling and the single writer actor
//! - Diesel migrations for the fixed tables
//! - Year-partitioned price tables (`prices_YYYY`) created on demand
//! - Store implementations for prices, no-data intervals, cache metadata and
//!   the trading calendar
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.
//! The core crate is database-agnostic and works with traits.
//!
//! ```text
//!       core (domain, orchestration)
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Store implementations
pub mod calendar;
pub mod prices;

// Re-export database utilities
pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool, WriteHandle};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, SqliteStorageError};

pub use calendar::SqliteCalendarStore;
pub use prices::SqlitePriceStore;

// Re-export from pricecache-core for convenience
pub use pricecache_core::errors::{Error, Result, StorageError};
