//! Database models for cached prices, no-data intervals and cache metadata.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::utils::{date_to_key, key_to_date, text_to_timestamp, timestamp_to_text};
use pricecache_core::prices::{NoDataInterval, NoDataKey, PricePoint, SymbolCacheMetadata};
use pricecache_core::Result;

/// Symbol id reserved for the wildcard no-data key.
pub const ALL_SYMBOLS_ID: i32 = 0;

/// One row of a `prices_YYYY` partition.
///
/// Partitions are created at runtime, so rows are read and written through
/// raw SQL rather than a `table!` definition.
#[derive(QueryableByName, Debug, Clone, PartialEq)]
pub struct PriceRowDB {
    #[diesel(sql_type = Integer)]
    pub date: i32,
    #[diesel(sql_type = Text)]
    pub open: String,
    #[diesel(sql_type = Text)]
    pub high: String,
    #[diesel(sql_type = Text)]
    pub low: String,
    #[diesel(sql_type = Text)]
    pub close: String,
    #[diesel(sql_type = Text)]
    pub adj_close: String,
    #[diesel(sql_type = BigInt)]
    pub volume: i64,
}

impl From<&PricePoint> for PriceRowDB {
    fn from(point: &PricePoint) -> Self {
        Self {
            date: date_to_key(point.date),
            open: point.open.to_string(),
            high: point.high.to_string(),
            low: point.low.to_string(),
            close: point.close.to_string(),
            adj_close: point.adj_close.to_string(),
            volume: point.volume,
        }
    }
}

impl PriceRowDB {
    pub fn into_point(self, symbol: &str) -> Result<PricePoint> {
        Ok(PricePoint {
            symbol: symbol.to_string(),
            date: key_to_date(self.date)?,
            open: Decimal::from_str(&self.open)?,
            high: Decimal::from_str(&self.high)?,
            low: Decimal::from_str(&self.low)?,
            close: Decimal::from_str(&self.close)?,
            adj_close: Decimal::from_str(&self.adj_close)?,
            volume: self.volume,
        })
    }
}

/// Name of a `sqlite_master` entry.
#[derive(QueryableByName, Debug)]
pub struct TableNameDB {
    #[diesel(sql_type = Text)]
    pub name: String,
}

/// Result of an `EXISTS (...)` probe.
#[derive(QueryableByName, Debug)]
pub struct ExistsDB {
    #[diesel(sql_type = Integer)]
    pub present: i32,
}

/// Database model for no-data intervals
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::no_data_intervals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NoDataIntervalDB {
    pub symbol_id: i32,
    pub start_date: i32,
    pub end_date: i32,
}

impl NoDataIntervalDB {
    pub fn new(symbol_id: i32, interval: &NoDataInterval) -> Self {
        Self {
            symbol_id,
            start_date: date_to_key(interval.start),
            end_date: date_to_key(interval.end),
        }
    }

    pub fn into_domain(self, key: NoDataKey) -> Result<NoDataInterval> {
        Ok(NoDataInterval::new(
            key,
            key_to_date(self.start_date)?,
            key_to_date(self.end_date)?,
        )?)
    }
}

/// Database model for per-symbol cache metadata
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::symbol_cache_metadata)]
#[diesel(primary_key(symbol_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SymbolCacheMetadataDB {
    pub symbol_id: i32,
    pub last_update: String,
    pub cached_start: i32,
    pub cached_end: i32,
    pub last_known_trading_date: i32,
}

impl SymbolCacheMetadataDB {
    pub fn new(symbol_id: i32, metadata: &SymbolCacheMetadata) -> Self {
        Self {
            symbol_id,
            last_update: timestamp_to_text(metadata.last_update),
            cached_start: date_to_key(metadata.cached_start),
            cached_end: date_to_key(metadata.cached_end),
            last_known_trading_date: date_to_key(metadata.last_known_trading_date),
        }
    }

    pub fn into_domain(self, symbol: &str) -> Result<SymbolCacheMetadata> {
        Ok(SymbolCacheMetadata::new(
            symbol,
            text_to_timestamp(&self.last_update)?,
            key_to_date(self.cached_start)?,
            key_to_date(self.cached_end)?,
            key_to_date(self.last_known_trading_date)?,
        ))
    }
}
