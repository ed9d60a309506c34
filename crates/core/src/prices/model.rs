//! Domain models for cached prices, confirmed absence and cache metadata.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pricecache_market_data::DailyBar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Reserved key text for intervals that apply to every symbol.
pub const ALL_SYMBOLS_KEY: &str = "ALL";

/// One cached daily observation for a symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub adj_close: Decimal,
    pub volume: i64,
}

impl PricePoint {
    /// Attach a symbol to an upstream bar.
    pub fn from_bar(symbol: &str, bar: DailyBar) -> Self {
        Self {
            symbol: symbol.to_string(),
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            adj_close: bar.adj_close,
            volume: bar.volume,
        }
    }

    /// Check non-negativity and `low <= {open, close} <= high`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("adj_close", self.adj_close),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| *v < Decimal::ZERO) {
            return Err(self.invalid(format!("{} is negative ({})", name, value)));
        }
        if self.volume < 0 {
            return Err(self.invalid(format!("volume is negative ({})", self.volume)));
        }
        if self.low > self.high {
            return Err(self.invalid(format!("low {} exceeds high {}", self.low, self.high)));
        }
        for (name, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(self.invalid(format!(
                    "{} {} outside [{}, {}]",
                    name, value, self.low, self.high
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ValidationError {
        ValidationError::InvalidPricePoint {
            symbol: self.symbol.clone(),
            date: self.date,
            reason,
        }
    }
}

/// Key of a no-data interval: one symbol or the wildcard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoDataKey {
    /// Applies to every symbol (market-wide closure).
    All,
    Symbol(String),
}

impl NoDataKey {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        NoDataKey::Symbol(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            NoDataKey::All => ALL_SYMBOLS_KEY,
            NoDataKey::Symbol(s) => s,
        }
    }
}

impl fmt::Display for NoDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range confirmed to have no data for a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoDataInterval {
    pub key: NoDataKey,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl NoDataInterval {
    pub fn new(key: NoDataKey, start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end });
        }
        Ok(Self { key, start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True when `[start, end]` lies entirely inside this interval.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= start && end <= self.end
    }

    /// True when the ranges overlap or the one starts the day after the other ends.
    pub fn overlaps_or_touches(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= end + Duration::days(1) && start <= self.end + Duration::days(1)
    }
}

/// Result of folding a new range into the existing intervals of one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoDataMerge {
    /// The single interval that replaces everything absorbed.
    pub merged: NoDataInterval,
    /// Existing intervals that must be removed.
    pub absorbed: Vec<NoDataInterval>,
}

impl NoDataMerge {
    /// Nothing to write: an existing interval already covers the new range.
    pub fn is_noop(&self) -> bool {
        self.absorbed.len() == 1 && self.absorbed[0] == self.merged
    }
}

/// Fold `[start, end]` into `existing` (all with key `key`).
///
/// Every existing interval overlapping or adjacent to the growing union is
/// absorbed, so the result never leaves two touching intervals behind.
pub fn merge_no_data(
    existing: &[NoDataInterval],
    key: NoDataKey,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<NoDataMerge, ValidationError> {
    let mut merged = NoDataInterval::new(key, start, end)?;
    let mut absorbed: Vec<NoDataInterval> = Vec::new();

    loop {
        let mut grew = false;
        for interval in existing.iter().filter(|i| i.key == merged.key) {
            if absorbed.contains(interval) || !interval.overlaps_or_touches(merged.start, merged.end) {
                continue;
            }
            merged.start = merged.start.min(interval.start);
            merged.end = merged.end.max(interval.end);
            absorbed.push(interval.clone());
            grew = true;
        }
        if !grew {
            break;
        }
    }

    absorbed.sort_by_key(|i| i.start);
    Ok(NoDataMerge { merged, absorbed })
}

/// Per-symbol bookkeeping of what the cache holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolCacheMetadata {
    pub symbol: String,
    /// Last time the symbol was fetched from upstream.
    pub last_update: DateTime<Utc>,
    pub cached_start: NaiveDate,
    pub cached_end: NaiveDate,
    pub last_known_trading_date: NaiveDate,
}

impl SymbolCacheMetadata {
    pub fn new(
        symbol: impl Into<String>,
        last_update: DateTime<Utc>,
        cached_start: NaiveDate,
        cached_end: NaiveDate,
        last_known_trading_date: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            last_update,
            cached_start,
            cached_end,
            last_known_trading_date,
        }
    }

    /// Updated less than `window` before `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.last_update) < window
    }

    /// Cached range includes `[start, end]`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.cached_start <= start && end <= self.cached_end
    }

    /// Record a completed fetch of `[start, end]` at `now`.
    ///
    /// Contiguous ranges are unioned; a disjoint window replaces the range
    /// because metadata tracks a single span.
    pub fn absorb_window(&mut self, start: NaiveDate, end: NaiveDate, now: DateTime<Utc>) {
        let contiguous = start <= self.cached_end + Duration::days(1)
            && self.cached_start <= end + Duration::days(1);
        if contiguous {
            self.cached_start = self.cached_start.min(start);
            self.cached_end = self.cached_end.max(end);
        } else {
            self.cached_start = start;
            self.cached_end = end;
        }
        self.last_update = now;
    }
}
