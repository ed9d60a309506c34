//! PriceCache Core - domain types, trading calendar and fetch orchestration.
//!
//! This crate is storage-agnostic. It defines the `PriceCacheStore` and
//! `CalendarStore` traits, implemented by `pricecache-storage-sqlite`, and
//! talks to upstream sources only through
//! [`UpstreamClient`](pricecache_market_data::UpstreamClient).

pub mod calendar;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod fetch;
pub mod prices;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use calendar::{CalendarConfig, CalendarMonth, CalendarStore, TradingCalendarOracle, YearMonth};
pub use fetch::{BatchOutcome, FailureCategory, FailureReport, FetchOrchestrator, OrchestratorConfig};
pub use prices::{NoDataInterval, NoDataKey, PriceCacheStore, PricePoint, SymbolCacheMetadata};
pub use retry::RetryPolicy;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
