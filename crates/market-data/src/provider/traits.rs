//! Upstream client trait definition.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::UpstreamError;
use crate::models::DailyBar;

/// Reference index whose sessions define the trading calendar (S&P 500).
pub const DEFAULT_REFERENCE_SYMBOL: &str = "^GSPC";

/// Trait for upstream daily-series sources.
///
/// Implement this trait to plug a new data source into the cache. The
/// orchestrator and the trading calendar only ever talk to this trait.
///
/// # Contract
///
/// - An empty `Ok(vec![])` means the source answered and had nothing for the
///   window. Callers record that as confirmed absence.
/// - Bars are returned ascending by date and lie within `[start, end]`.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use pricecache_market_data::{DailyBar, UpstreamClient, UpstreamError};
///
/// struct CsvMirror;
///
/// #[async_trait]
/// impl UpstreamClient for CsvMirror {
///     fn id(&self) -> &'static str {
///         "CSV_MIRROR"
///     }
///
///     async fn fetch_series(
///         &self,
///         symbol: &str,
///         start: NaiveDate,
///         end: NaiveDate,
///     ) -> Result<Vec<DailyBar>, UpstreamError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Unique identifier for this client, used in logs and error messages.
    fn id(&self) -> &'static str;

    /// Symbol of the reference index used by the trading calendar.
    fn reference_symbol(&self) -> &str {
        DEFAULT_REFERENCE_SYMBOL
    }

    /// Fetch daily bars for `symbol` between `start` and `end` (inclusive).
    async fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, UpstreamError>;

    /// Fetch daily bars of the reference index between `start` and `end`.
    ///
    /// The default implementation delegates to [`fetch_series`](Self::fetch_series)
    /// with [`reference_symbol`](Self::reference_symbol).
    async fn fetch_reference_index_series(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, UpstreamError> {
        let symbol = self.reference_symbol().to_string();
        self.fetch_series(&symbol, start, end).await
    }
}
