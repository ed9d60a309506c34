//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`UpstreamError`]: The error enum returned by every [`UpstreamClient`](crate::UpstreamClient)
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching a series from the upstream source.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The provider rate limited the request (HTTP 429).
    /// Should retry with a longer backoff.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// Server-provided hint, when the response carried one
        retry_after: Option<Duration>,
    },

    /// The requested symbol does not exist upstream.
    /// Terminal, and treated by the cache as confirmed absence of data.
    #[error("Symbol not found: {0}")]
    NotFound(String),

    /// The provider answered, but the payload could not be turned into bars.
    #[error("Parse error for {symbol}: {message}")]
    ParseError {
        /// Symbol whose payload failed to parse
        symbol: String,
        /// Description of the parse failure
        message: String,
    },

    /// A transient I/O failure (timeout, reset connection, 5xx).
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// A network error raised by the HTTP layer.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricecache_market_data::errors::{RetryClass, UpstreamError};
    ///
    /// let error = UpstreamError::RateLimited { provider: "YAHOO".to_string(), retry_after: None };
    /// assert_eq!(error.retry_class(), RetryClass::LongBackoff);
    ///
    /// let error = UpstreamError::NotFound("INVALID".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::NotFound(_) | Self::ParseError { .. } => RetryClass::Never,
            Self::Transient(_) | Self::Network(_) => RetryClass::WithBackoff,
            Self::RateLimited { .. } => RetryClass::LongBackoff,
        }
    }

    /// Returns true when the upstream confirmed the symbol has no data.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Builds a parse error for a symbol.
    pub fn parse(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            symbol: symbol.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_never_retries() {
        let error = UpstreamError::NotFound("INVALID".to_string());
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert!(error.is_not_found());
    }

    #[test]
    fn test_parse_error_never_retries() {
        let error = UpstreamError::parse("ZZZZ", "unexpected payload");
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert!(!error.retry_class().is_retryable());
    }

    #[test]
    fn test_transient_retries_with_backoff() {
        let error = UpstreamError::Transient("connection reset".to_string());
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_rate_limited_retries_with_long_backoff() {
        let error = UpstreamError::RateLimited {
            provider: "YAHOO".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.retry_class(), RetryClass::LongBackoff);
        assert!(error.retry_class().is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = UpstreamError::NotFound("INVALID".to_string());
        assert_eq!(format!("{}", error), "Symbol not found: INVALID");

        let error = UpstreamError::parse("ZZZZ_INVALID", "missing close");
        assert_eq!(
            format!("{}", error),
            "Parse error for ZZZZ_INVALID: missing close"
        );
    }
}
