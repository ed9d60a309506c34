//! Generic retry executor shared by the store, the calendar oracle and the
//! fetch orchestrator.
//!
//! A [`RetryPolicy`] pairs a backoff schedule with a classifier that maps an
//! error onto a [`RetryClass`]. `Never` errors return immediately, `WithBackoff`
//! errors wait `base_delay * multiplier^(attempt - 1)` plus jitter, and
//! `LongBackoff` errors additionally scale that delay by `long_backoff_factor`.
//!
//! ```rust,ignore
//! let policy = RetryPolicy::upstream_fetch();
//! let bars = policy
//!     .execute("fetch AAPL", || client.fetch_series("AAPL", start, end))
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use pricecache_market_data::{RetryClass, UpstreamError};
use rand::Rng;

use crate::errors::Error;

/// Backoff schedule plus error classification.
pub struct RetryPolicy<E> {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Growth factor applied per further attempt.
    pub backoff_multiplier: f64,
    /// Uniform random delay added on top, `(min, max)`.
    pub jitter: (Duration, Duration),
    /// Extra scale for [`RetryClass::LongBackoff`] errors.
    pub long_backoff_factor: f64,
    /// Maps an error onto its retry class.
    pub classify: fn(&E) -> RetryClass,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            long_backoff_factor: self.long_backoff_factor,
            classify: self.classify,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("long_backoff_factor", &self.long_backoff_factor)
            .finish()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    /// Single attempt, never sleeps.
    pub fn none(classify: fn(&E) -> RetryClass) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: (Duration::ZERO, Duration::ZERO),
            long_backoff_factor: 1.0,
            classify,
        }
    }

    /// Same attempt count, but every delay is zero.
    pub fn without_delays(mut self) -> Self {
        self.base_delay = Duration::ZERO;
        self.jitter = (Duration::ZERO, Duration::ZERO);
        self
    }

    /// Override the attempt count.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32, class: RetryClass) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if class == RetryClass::LongBackoff {
            secs *= self.long_backoff_factor;
        }
        let base = Duration::from_secs_f64(secs.max(0.0));
        base + random_between(self.jitter.0, self.jitter.1)
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_counted(label, operation).await.0
    }

    /// Like [`execute`](Self::execute), also returning the number of attempts made.
    pub async fn execute_counted<T, F, Fut>(&self, label: &str, mut operation: F) -> (Result<T, E>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return (Ok(value), attempt);
                }
                Err(e) => e,
            };

            let class = (self.classify)(&error);
            if !class.is_retryable() {
                debug!("{} failed with a terminal error: {}", label, error);
                return (Err(error), attempt);
            }
            if attempt >= max_attempts {
                warn!("{} failed after {} attempts: {}", label, attempt, error);
                return (Err(error), attempt);
            }

            let delay = self.delay_for(attempt, class);
            debug!(
                "{} failed (attempt {}/{}), retrying in {:?}: {}",
                label, attempt, max_attempts, delay, error
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl RetryPolicy<Error> {
    /// Busy/locked storage: 5 attempts, 100 ms doubling, 0-100 ms jitter.
    pub fn storage_busy() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter: (Duration::ZERO, Duration::from_millis(100)),
            long_backoff_factor: 1.0,
            classify: classify_storage,
        }
    }
}

impl RetryPolicy<UpstreamError> {
    /// Per-symbol upstream call: 3 attempts, 1 s doubling, small jitter.
    pub fn upstream_fetch() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: (Duration::ZERO, Duration::from_millis(250)),
            long_backoff_factor: 4.0,
            classify: UpstreamError::retry_class,
        }
    }

    /// Reference index refresh: 3 attempts, 2 s doubling.
    pub fn calendar_refresh() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: (Duration::ZERO, Duration::ZERO),
            long_backoff_factor: 2.0,
            classify: UpstreamError::retry_class,
        }
    }
}

/// Only busy storage errors are worth another attempt.
pub fn classify_storage(error: &Error) -> RetryClass {
    match error {
        Error::Storage(e) if e.is_busy() => RetryClass::WithBackoff,
        _ => RetryClass::Never,
    }
}

/// Uniform random duration in `[min, max]`.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(millis as u64)
}
