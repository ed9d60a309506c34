//! Yahoo Finance upstream client.
//!
//! Fetches daily OHLCV history through the `yahoo_finance_api` connector and
//! maps the library's errors onto [`UpstreamError`].

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::errors::UpstreamError;
use crate::models::DailyBar;
use crate::provider::{UpstreamClient, DEFAULT_REFERENCE_SYMBOL};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};

const PROVIDER_ID: &str = "YAHOO";

/// Decimal places kept from Yahoo's float prices.
const PRICE_SCALE: u32 = 6;

/// Yahoo Finance upstream client.
pub struct YahooClient {
    connector: yahoo::YahooConnector,
    limiter: RateLimiter,
    reference_symbol: String,
}

impl YahooClient {
    /// Create a client with the default rate limit and reference index.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_rate_limit(RateLimitConfig::default())
    }

    /// Create a client with a custom rate limit.
    pub fn with_rate_limit(config: RateLimitConfig) -> Result<Self, UpstreamError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| {
            UpstreamError::Transient(format!("Failed to initialize Yahoo connector: {}", e))
        })?;
        Ok(Self {
            connector,
            limiter: RateLimiter::new(PROVIDER_ID, config),
            reference_symbol: DEFAULT_REFERENCE_SYMBOL.to_string(),
        })
    }

    /// Override the reference index used for the trading calendar.
    pub fn with_reference_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.reference_symbol = symbol.into();
        self
    }

    fn date_to_offset_datetime(date: NaiveDate) -> OffsetDateTime {
        let midnight = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
        OffsetDateTime::from_unix_timestamp(midnight.timestamp())
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn to_decimal(symbol: &str, field: &str, value: f64) -> Result<Decimal, UpstreamError> {
        Decimal::from_f64(value)
            .map(|d| d.round_dp(PRICE_SCALE))
            .ok_or_else(|| UpstreamError::parse(symbol, format!("{} is not a number: {}", field, value)))
    }

    /// Convert a Yahoo quote into a bar.
    fn yahoo_quote_to_bar(symbol: &str, quote: &yahoo::Quote) -> Result<DailyBar, UpstreamError> {
        let timestamp = Utc
            .timestamp_opt(quote.timestamp as i64, 0)
            .single()
            .ok_or_else(|| {
                UpstreamError::parse(symbol, format!("Invalid timestamp: {}", quote.timestamp))
            })?;

        let volume = i64::try_from(quote.volume)
            .map_err(|_| UpstreamError::parse(symbol, format!("Volume out of range: {}", quote.volume)))?;

        Ok(DailyBar {
            date: timestamp.date_naive(),
            open: Self::to_decimal(symbol, "open", quote.open)?,
            high: Self::to_decimal(symbol, "high", quote.high)?,
            low: Self::to_decimal(symbol, "low", quote.low)?,
            close: Self::to_decimal(symbol, "close", quote.close)?,
            adj_close: Self::to_decimal(symbol, "adjclose", quote.adjclose)?,
            volume,
        })
    }

    /// Map a connector error onto the upstream taxonomy.
    fn map_error(symbol: &str, error: yahoo::YahooError) -> UpstreamError {
        match error {
            yahoo::YahooError::NoResult => UpstreamError::NotFound(symbol.to_string()),
            yahoo::YahooError::FetchFailed(message) => classify_fetch_failure(symbol, &message),
            other => {
                let message = other.to_string();
                if looks_transient(&message) {
                    UpstreamError::Transient(message)
                } else {
                    UpstreamError::parse(symbol, message)
                }
            }
        }
    }
}

/// Classify a failed HTTP exchange by the status text the connector reports.
fn classify_fetch_failure(symbol: &str, message: &str) -> UpstreamError {
    if message.contains("429") || message.to_ascii_lowercase().contains("too many requests") {
        UpstreamError::RateLimited {
            provider: PROVIDER_ID.to_string(),
            retry_after: None,
        }
    } else if message.contains("404") {
        UpstreamError::NotFound(symbol.to_string())
    } else {
        UpstreamError::Transient(message.to_string())
    }
}

fn looks_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["timed out", "timeout", "connection", "reset", "temporarily"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[async_trait]
impl UpstreamClient for YahooClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, UpstreamError> {
        debug!("Fetching {} from {} to {} from Yahoo", symbol, start, end);

        self.limiter.acquire().await;

        // Yahoo treats the end bound as exclusive.
        let start_time = Self::date_to_offset_datetime(start);
        let end_time = Self::date_to_offset_datetime(end + Duration::days(1));

        let response = match self
            .connector
            .get_quote_history(symbol, start_time, end_time)
            .await
        {
            Ok(response) => response,
            Err(yahoo::YahooError::NoQuotes) => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_error(symbol, e)),
        };

        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(yahoo::YahooError::NoQuotes) => {
                debug!("No quotes for '{}' between {} and {}", symbol, start, end);
                return Ok(Vec::new());
            }
            Err(e) => return Err(Self::map_error(symbol, e)),
        };

        let mut bars = Vec::with_capacity(quotes.len());
        let mut last_error = None;
        for quote in &quotes {
            match Self::yahoo_quote_to_bar(symbol, quote) {
                Ok(bar) if bar.date >= start && bar.date <= end => bars.push(bar),
                Ok(_) => {}
                Err(e) => {
                    warn!("Skipping Yahoo quote for {}: {}", symbol, e);
                    last_error = Some(e);
                }
            }
        }

        // Every row was garbage: surface it instead of pretending the window is empty.
        if bars.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let error = classify_fetch_failure("AAPL", "status 429 Too Many Requests");
        assert!(matches!(error, UpstreamError::RateLimited { .. }));
    }

    #[test]
    fn test_classify_not_found() {
        let error = classify_fetch_failure("NOPE", "status 404");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_classify_other_failures_are_transient() {
        let error = classify_fetch_failure("AAPL", "status 503");
        assert!(matches!(error, UpstreamError::Transient(_)));
    }

    #[test]
    fn test_looks_transient() {
        assert!(looks_transient("operation timed out"));
        assert!(looks_transient("Connection reset by peer"));
        assert!(!looks_transient("invalid JSON at line 1"));
    }

    #[test]
    fn test_to_decimal_rejects_nan() {
        assert!(YahooClient::to_decimal("AAPL", "close", f64::NAN).is_err());
        let value = YahooClient::to_decimal("AAPL", "close", 123.4567891).unwrap();
        assert_eq!(value.scale(), 6);
    }

    #[test]
    fn test_date_to_offset_datetime_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let odt = YahooClient::date_to_offset_datetime(date);
        assert_eq!(odt.unix_timestamp(), 1_672_704_000);
    }
}
