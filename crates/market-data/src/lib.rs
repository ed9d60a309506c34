//! PriceCache Market Data Crate
//!
//! This crate defines the upstream capability the cache is filled from, and
//! ships one concrete implementation backed by Yahoo Finance.
//!
//! # Overview
//!
//! - [`UpstreamClient`] - daily OHLCV series for a symbol, plus the series of
//!   a fixed reference index used to derive the trading calendar
//! - [`UpstreamError`] - the upstream failure taxonomy, each variant mapped to
//!   a [`RetryClass`]
//! - [`RateLimiter`] - token bucket used by concrete clients to stay under a
//!   provider's request budget
//!
//! # Architecture
//!
//! ```text
//! +--------------------+
//! |  FetchOrchestrator |   (pricecache-core)
//! |  CalendarOracle    |
//! +--------------------+
//!           |
//!           v
//! +--------------------+
//! |   UpstreamClient   |   (this crate, trait)
//! +--------------------+
//!           |
//!           v
//! +--------------------+
//! |    YahooClient     |   (rate limited, maps library errors)
//! +--------------------+
//! ```

pub mod errors;
pub mod models;
pub mod provider;
pub mod rate_limiter;

pub use errors::{RetryClass, UpstreamError};
pub use models::DailyBar;
pub use provider::yahoo::YahooClient;
pub use provider::{UpstreamClient, DEFAULT_REFERENCE_SYMBOL};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
