//! Upstream data models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar as returned by an upstream source.
///
/// Bars carry no symbol; the caller knows which symbol it asked for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBar {
    /// Session date
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Close adjusted for splits and dividends
    pub adj_close: Decimal,
    pub volume: i64,
}

impl DailyBar {
    /// Create a bar whose adjusted close equals its close.
    pub fn new(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: i64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            adj_close: close,
            volume,
        }
    }

    /// Set the adjusted close.
    pub fn with_adj_close(mut self, adj_close: Decimal) -> Self {
        self.adj_close = adj_close;
        self
    }
}
