//! Trading calendar oracle.
//!
//! Answers "was this a trading day?" from a month-granularity calendar built
//! from the reference index series. Months are refreshed on demand:
//!
//! ```text
//! Unknown ──▶ Fetching ──▶ Fresh ──(7 days)──▶ Stale ──▶ Fetching ──▶ …
//! ```
//!
//! The current and previous month are always stale in storage, since new
//! sessions keep landing in them. Within one process a refresh of those
//! months is trusted for `recent_month_ttl`.
//!
//! Refreshes of the same month are single-flight: callers queue on a
//! per-month gate and re-read storage once they get through. A caller that
//! waited `coalesce_polls × coalesce_poll_interval` refreshes on its own.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use pricecache_market_data::{DailyBar, UpstreamClient, UpstreamError};
use tokio::sync::Mutex as AsyncMutex;

use super::model::{CalendarMonth, PartitionState, YearMonth};
use super::planning::{
    classify_partition, fast_path_trading_day, is_recent_month, is_weekend,
    last_session_candidate, month_fetch_window, months_between, previous_weekday,
    weekdays_between,
};
use super::store::CalendarStore;
use crate::clock::{system_clock, Clock};
use crate::constants::{
    CALENDAR_STALE_AFTER_DAYS, COALESCE_POLLS, COALESCE_POLL_INTERVAL_MS,
    LATEST_SESSION_LOOKBACK_MONTHS, RECENT_MONTH_TTL_SECS, SESSION_CLOSE_HOUR_UTC,
};
use crate::errors::Result;
use crate::prices::{NoDataKey, PriceCacheStore};
use crate::retry::RetryPolicy;

/// Calendar oracle settings.
#[derive(Clone, Debug)]
pub struct CalendarConfig {
    /// Overrides the upstream client's own reference index when set.
    pub reference_symbol: Option<String>,
    pub stale_after: Duration,
    pub recent_month_ttl: StdDuration,
    pub coalesce_polls: u32,
    pub coalesce_poll_interval: StdDuration,
    pub refresh_retry: RetryPolicy<UpstreamError>,
    /// Treat a range containing today or yesterday (weekday) as having a
    /// session without consulting the calendar.
    pub trust_recent_weekdays: bool,
    pub session_close_hour_utc: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            reference_symbol: None,
            stale_after: Duration::days(CALENDAR_STALE_AFTER_DAYS),
            recent_month_ttl: StdDuration::from_secs(RECENT_MONTH_TTL_SECS),
            coalesce_polls: COALESCE_POLLS,
            coalesce_poll_interval: StdDuration::from_millis(COALESCE_POLL_INTERVAL_MS),
            refresh_retry: RetryPolicy::calendar_refresh(),
            trust_recent_weekdays: true,
            session_close_hour_utc: SESSION_CLOSE_HOUR_UTC,
        }
    }
}

/// Shared trading-day oracle. Create one per process and pass it around in an `Arc`.
pub struct TradingCalendarOracle {
    upstream: Arc<dyn UpstreamClient>,
    calendar: Arc<dyn CalendarStore>,
    prices: Arc<dyn PriceCacheStore>,
    config: CalendarConfig,
    clock: Clock,
    gates: Mutex<HashMap<YearMonth, Arc<AsyncMutex<()>>>>,
    recent_refreshes: Mutex<HashMap<YearMonth, Instant>>,
}

impl TradingCalendarOracle {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        calendar: Arc<dyn CalendarStore>,
        prices: Arc<dyn PriceCacheStore>,
        config: CalendarConfig,
    ) -> Self {
        Self {
            upstream,
            calendar,
            prices,
            config,
            clock: system_clock(),
            gates: Mutex::new(HashMap::new()),
            recent_refreshes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// True if `date` had a session of the reference index.
    ///
    /// Weekends, future dates and market-wide no-data dates are false without
    /// a refresh. If the month cannot be refreshed the answer is `true`, so
    /// callers fetch rather than skip.
    pub async fn is_trading_day(&self, date: NaiveDate) -> Result<bool> {
        if self.prices.no_data_covers(&NoDataKey::All, date, date)? {
            return Ok(false);
        }
        if is_weekend(date) || date > self.today() {
            return Ok(false);
        }

        match self.load_month(YearMonth::from_date(date)).await {
            Ok(month) => Ok(month.contains(date)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    "Calendar unavailable for {}, assuming it is a trading day: {}",
                    date, e
                );
                Ok(true)
            }
        }
    }

    /// True if `[start, end]` contains at least one session.
    ///
    /// Used to skip fetches for windows that cannot hold data (weekends,
    /// holidays, windows in the future).
    pub async fn date_range_has_trading_day(&self, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        if start > end {
            return Ok(false);
        }
        let today = self.today();
        if self.config.trust_recent_weekdays && fast_path_trading_day(start, end, today) {
            debug!("Assuming {}..{} has a session (recent weekday)", start, end);
            return Ok(true);
        }

        let end = end.min(today);
        if start > end {
            return Ok(false);
        }

        let closures = self.prices.no_data_intervals(&NoDataKey::All)?;
        for month in months_between(start, end) {
            let lo = month.first_day().map_or(start, |first| first.max(start));
            let hi = month.last_day().map_or(end, |last| last.min(end));
            let candidates: Vec<NaiveDate> = weekdays_between(lo, hi)
                .into_iter()
                .filter(|d| !closures.iter().any(|c| c.contains(*d)))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            match self.load_month(month).await {
                Ok(calendar) => {
                    if candidates.iter().any(|d| calendar.contains(*d)) {
                        return Ok(true);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Calendar unavailable for {}, assuming {}..{} has a session: {}",
                        month, start, end, e
                    );
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// The most recent session that has closed.
    ///
    /// Falls back to the most recent weekday if the calendar cannot be refreshed.
    pub async fn latest_completed_trading_day(&self) -> Result<NaiveDate> {
        let candidate = last_session_candidate((self.clock)(), self.config.session_close_hour_utc);
        let mut month = YearMonth::from_date(candidate);

        for _ in 0..LATEST_SESSION_LOOKBACK_MONTHS {
            match self.load_month(month).await {
                Ok(calendar) => {
                    if let Some(day) = calendar.latest_on_or_before(candidate) {
                        return Ok(day);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let fallback = previous_weekday(candidate);
                    warn!(
                        "Calendar unavailable for {}, using {} as the latest session: {}",
                        month, fallback, e
                    );
                    return Ok(fallback);
                }
            }
            month = month.pred();
        }

        let fallback = previous_weekday(candidate);
        warn!(
            "No session found in the last {} months, using {}",
            LATEST_SESSION_LOOKBACK_MONTHS, fallback
        );
        Ok(fallback)
    }

    /// Refresh `month` regardless of its state, replacing its stored days.
    pub async fn force_refresh(&self, month: YearMonth) -> Result<CalendarMonth> {
        let gate = self.gate_for(month);
        let _guard = gate.lock().await;
        self.refresh_month(month).await
    }

    /// Current state of `month`, for diagnostics.
    pub fn partition_state(&self, month: YearMonth) -> Result<PartitionState> {
        let in_flight = lock(&self.gates)
            .get(&month)
            .is_some_and(|gate| gate.try_lock().is_err());
        if in_flight {
            return Ok(PartitionState::Fetching);
        }

        let stored = self.calendar.get_month(month)?;
        if self.is_usable(month, stored.as_ref()) {
            return Ok(PartitionState::Fresh);
        }
        Ok(classify_partition(stored.as_ref(), (self.clock)(), self.config.stale_after))
    }

    fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    /// The month's calendar, refreshing it first if it cannot answer.
    async fn load_month(&self, month: YearMonth) -> Result<CalendarMonth> {
        if let Some(stored) = self.usable_month(month)? {
            return Ok(stored);
        }

        let gate = self.gate_for(month);
        let wait = self.config.coalesce_poll_interval * self.config.coalesce_polls;
        let guard = match tokio::time::timeout(wait, gate.lock_owned()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(
                    "Calendar refresh for {} still running after {:?}, refreshing independently",
                    month, wait
                );
                None
            }
        };

        // Whoever held the gate may have refreshed the month already.
        if guard.is_some() {
            if let Some(stored) = self.usable_month(month)? {
                debug!("Calendar for {} refreshed by a concurrent caller", month);
                return Ok(stored);
            }
        }

        let refreshed = self.refresh_month(month).await;
        drop(guard);
        refreshed
    }

    fn usable_month(&self, month: YearMonth) -> Result<Option<CalendarMonth>> {
        let stored = self.calendar.get_month(month)?;
        if self.is_usable(month, stored.as_ref()) {
            Ok(stored)
        } else {
            Ok(None)
        }
    }

    fn is_usable(&self, month: YearMonth, stored: Option<&CalendarMonth>) -> bool {
        let now = (self.clock)();
        match classify_partition(stored, now, self.config.stale_after) {
            PartitionState::Fresh => true,
            PartitionState::Stale if is_recent_month(month, now.date_naive()) => {
                lock(&self.recent_refreshes)
                    .get(&month)
                    .is_some_and(|at| at.elapsed() < self.config.recent_month_ttl)
            }
            _ => false,
        }
    }

    async fn refresh_month(&self, month: YearMonth) -> Result<CalendarMonth> {
        let now = (self.clock)();
        let today = now.date_naive();
        let Some((start, end)) = month_fetch_window(month, today) else {
            return Ok(CalendarMonth::new(month, BTreeSet::new(), now));
        };

        info!("Refreshing trading calendar for {} ({} to {})", month, start, end);
        let label = format!("calendar refresh {}", month);
        let bars = self
            .config
            .refresh_retry
            .execute(&label, || self.fetch_reference(start, end))
            .await?;

        let calendar = CalendarMonth::from_sessions(month, bars.iter().map(|bar| bar.date), now);
        self.calendar.replace_month(&calendar).await?;

        if is_recent_month(month, today) {
            lock(&self.recent_refreshes).insert(month, Instant::now());
        }
        debug!(
            "Calendar for {} has {} sessions",
            month,
            calendar.trading_days.len()
        );
        Ok(calendar)
    }

    async fn fetch_reference(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<DailyBar>, UpstreamError> {
        match &self.config.reference_symbol {
            Some(symbol) => self.upstream.fetch_series(symbol, start, end).await,
            None => self.upstream.fetch_reference_index_series(start, end).await,
        }
    }

    fn gate_for(&self, month: YearMonth) -> Arc<AsyncMutex<()>> {
        lock(&self.gates)
            .entry(month)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Lock a map mutex, recovering from poison. The maps only hold caches.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
