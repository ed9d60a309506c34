//! Price cache storage trait.
//!
//! The SQLite implementation lives in `pricecache-storage-sqlite`; tests in
//! this crate use an in-memory implementation.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::model::{NoDataInterval, NoDataKey, PricePoint, SymbolCacheMetadata};
use crate::errors::Result;

/// Durable cache of daily prices, confirmed-absence intervals and per-symbol
/// metadata.
///
/// Mutations are async because they go through the single writer; reads are
/// sync and served from pooled connections.
///
/// Mutating calls absorb transient busy conditions internally. Any error they
/// return is fatal to the calling operation.
#[async_trait]
pub trait PriceCacheStore: Send + Sync {
    /// Insert or replace points keyed by (symbol, date). Returns rows written.
    async fn upsert(&self, symbol: &str, points: &[PricePoint]) -> Result<usize>;

    /// Cached points for `symbol` within `[start, end]`, ascending by date.
    ///
    /// Missing dates are simply absent; they are never reported as no-data.
    fn query(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>>;

    /// True if any point for `symbol` is cached in any year.
    fn has_any_data(&self, symbol: &str) -> Result<bool>;

    /// Record confirmed absence for `[start, end]`, merging with every
    /// overlapping or adjacent interval of the same key. Returns the merged
    /// interval.
    async fn record_no_data(
        &self,
        key: &NoDataKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NoDataInterval>;

    /// True if `date` falls inside an interval for `symbol` or for the wildcard.
    fn is_no_data(&self, symbol: &str, date: NaiveDate) -> Result<bool>;

    /// True if a single interval of exactly `key` contains `[start, end]`.
    fn no_data_covers(&self, key: &NoDataKey, start: NaiveDate, end: NaiveDate) -> Result<bool>;

    /// All intervals recorded for `key`, ascending by start.
    fn no_data_intervals(&self, key: &NoDataKey) -> Result<Vec<NoDataInterval>>;

    fn get_metadata(&self, symbol: &str) -> Result<Option<SymbolCacheMetadata>>;

    async fn save_metadata(&self, metadata: &SymbolCacheMetadata) -> Result<()>;
}
