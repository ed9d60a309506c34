//! In-memory stores and a scripted upstream client for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use pricecache_market_data::{DailyBar, UpstreamClient, UpstreamError, DEFAULT_REFERENCE_SYMBOL};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calendar::planning::weekdays_between;
use crate::calendar::{CalendarMonth, CalendarStore, YearMonth};
use crate::errors::{Result, StorageError, ValidationError};
use crate::prices::{
    merge_no_data, NoDataInterval, NoDataKey, PriceCacheStore, PricePoint, SymbolCacheMetadata,
};

pub fn bar(date: NaiveDate, close: Decimal) -> DailyBar {
    DailyBar::new(date, close, close + dec!(1), (close - dec!(1)).max(Decimal::ZERO), close, 1_000)
}

/// One bar per weekday in `[start, end]`.
pub fn weekday_bars(start: NaiveDate, end: NaiveDate, close: Decimal) -> Vec<DailyBar> {
    weekdays_between(start, end)
        .into_iter()
        .map(|date| bar(date, close))
        .collect()
}

// =============================================================================
// Upstream
// =============================================================================

/// Start and end of every upstream call, in the order they happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallEvent {
    Started(String),
    Finished(String),
}

pub struct MockUpstream {
    series: Mutex<HashMap<String, Vec<DailyBar>>>,
    queued_failures: Mutex<HashMap<String, VecDeque<UpstreamError>>>,
    permanent_failures: Mutex<HashMap<String, fn() -> UpstreamError>>,
    calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
    delay: Mutex<Option<Duration>>,
    symbol_delays: Mutex<HashMap<String, Duration>>,
    events: Mutex<Vec<CallEvent>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            queued_failures: Mutex::new(HashMap::new()),
            permanent_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            symbol_delays: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_series(&self, symbol: &str, bars: Vec<DailyBar>) {
        self.series.lock().unwrap().insert(symbol.to_string(), bars);
    }

    /// Reference sessions on every weekday of `[start, end]` except `holidays`.
    pub fn set_reference_sessions_weekdays(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        holidays: &[NaiveDate],
    ) {
        let bars = weekday_bars(start, end, dec!(4500))
            .into_iter()
            .filter(|b| !holidays.contains(&b.date))
            .collect();
        self.set_series(DEFAULT_REFERENCE_SYMBOL, bars);
    }

    /// Fail every call for `symbol`.
    pub fn fail_always(&self, symbol: &str, error: fn() -> UpstreamError) {
        self.permanent_failures
            .lock()
            .unwrap()
            .insert(symbol.to_string(), error);
    }

    /// Fail the next calls for `symbol` with `errors`, in order.
    pub fn fail_next(&self, symbol: &str, errors: Vec<UpstreamError>) {
        self.queued_failures
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Delay only the calls for `symbol`, overriding [`set_delay`](Self::set_delay).
    pub fn set_symbol_delay(&self, symbol: &str, delay: Duration) {
        self.symbol_delays
            .lock()
            .unwrap()
            .insert(symbol.to_string(), delay);
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == symbol)
            .count()
    }

    pub fn windows_for(&self, symbol: &str) -> Vec<(NaiveDate, NaiveDate)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == symbol)
            .map(|(_, start, end)| (*start, *end))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<DailyBar>, UpstreamError> {
        if let Some(error) = self.permanent_failures.lock().unwrap().get(symbol) {
            return Err(error());
        }
        if let Some(error) = self
            .queued_failures
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        match self.series.lock().unwrap().get(symbol) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect()),
            None => Err(UpstreamError::NotFound(symbol.to_string())),
        }
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    fn id(&self) -> &'static str {
        "MOCK"
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<DailyBar>, UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), start, end));
        self.events
            .lock()
            .unwrap()
            .push(CallEvent::Started(symbol.to_string()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = self
            .symbol_delays
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .or(*self.delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.answer(symbol, start, end);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(CallEvent::Finished(symbol.to_string()));
        result
    }
}

// =============================================================================
// Price store
// =============================================================================

#[derive(Default)]
pub struct InMemoryPriceStore {
    points: Mutex<BTreeMap<(String, NaiveDate), PricePoint>>,
    no_data: Mutex<Vec<NoDataInterval>>,
    metadata: Mutex<HashMap<String, SymbolCacheMetadata>>,
    write_fault: Mutex<Option<String>>,
    corrupt_metadata: Mutex<HashSet<String>>,
    upserts: AtomicUsize,
    metadata_saves: AtomicUsize,
}

impl InMemoryPriceStore {
    pub fn add_no_data(&self, key: NoDataKey, start: NaiveDate, end: NaiveDate) {
        self.no_data
            .lock()
            .unwrap()
            .push(NoDataInterval::new(key, start, end).unwrap());
    }

    pub fn set_metadata(&self, metadata: SymbolCacheMetadata) {
        self.metadata
            .lock()
            .unwrap()
            .insert(metadata.symbol.clone(), metadata);
    }

    pub fn metadata(&self, symbol: &str) -> Option<SymbolCacheMetadata> {
        self.metadata.lock().unwrap().get(symbol).cloned()
    }

    pub fn point_count(&self, symbol: &str) -> usize {
        self.points
            .lock()
            .unwrap()
            .keys()
            .filter(|(s, _)| s == symbol)
            .count()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn metadata_saves(&self) -> usize {
        self.metadata_saves.load(Ordering::SeqCst)
    }

    /// Make `get_metadata(symbol)` fail as if its row could not be decoded.
    pub fn corrupt_metadata(&self, symbol: &str) {
        self.corrupt_metadata
            .lock()
            .unwrap()
            .insert(symbol.to_string());
    }

    /// Make every subsequent write fail with a storage fault.
    pub fn fail_writes(&self, message: &str) {
        *self.write_fault.lock().unwrap() = Some(message.to_string());
    }

    fn check_writable(&self) -> Result<()> {
        match self.write_fault.lock().unwrap().as_ref() {
            Some(message) => Err(StorageError::Fault(message.clone()).into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PriceCacheStore for InMemoryPriceStore {
    async fn upsert(&self, symbol: &str, points: &[PricePoint]) -> Result<usize> {
        self.check_writable()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.points.lock().unwrap();
        for point in points {
            stored.insert((symbol.to_string(), point.date), point.clone());
        }
        Ok(points.len())
    }

    fn query(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        Ok(self
            .points
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.symbol == symbol && p.date >= start && p.date <= end)
            .cloned()
            .collect())
    }

    fn has_any_data(&self, symbol: &str) -> Result<bool> {
        Ok(self.point_count(symbol) > 0)
    }

    async fn record_no_data(
        &self,
        key: &NoDataKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NoDataInterval> {
        self.check_writable()?;
        let mut intervals = self.no_data.lock().unwrap();
        let merge = merge_no_data(&intervals, key.clone(), start, end)?;
        intervals.retain(|i| !merge.absorbed.contains(i));
        intervals.push(merge.merged.clone());
        Ok(merge.merged)
    }

    fn is_no_data(&self, symbol: &str, date: NaiveDate) -> Result<bool> {
        Ok(self.no_data.lock().unwrap().iter().any(|i| {
            (i.key == NoDataKey::All || i.key.as_str() == symbol) && i.contains(date)
        }))
    }

    fn no_data_covers(&self, key: &NoDataKey, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        Ok(self
            .no_data
            .lock()
            .unwrap()
            .iter()
            .any(|i| &i.key == key && i.covers(start, end)))
    }

    fn no_data_intervals(&self, key: &NoDataKey) -> Result<Vec<NoDataInterval>> {
        let mut intervals: Vec<NoDataInterval> = self
            .no_data
            .lock()
            .unwrap()
            .iter()
            .filter(|i| &i.key == key)
            .cloned()
            .collect();
        intervals.sort_by_key(|i| i.start);
        Ok(intervals)
    }

    fn get_metadata(&self, symbol: &str) -> Result<Option<SymbolCacheMetadata>> {
        if self.corrupt_metadata.lock().unwrap().contains(symbol) {
            return Err(ValidationError::InvalidInput(format!("corrupt metadata row for {}", symbol)).into());
        }
        Ok(self.metadata(symbol))
    }

    async fn save_metadata(&self, metadata: &SymbolCacheMetadata) -> Result<()> {
        self.check_writable()?;
        self.metadata_saves.fetch_add(1, Ordering::SeqCst);
        self.set_metadata(metadata.clone());
        Ok(())
    }
}

// =============================================================================
// Calendar store
// =============================================================================

#[derive(Default)]
pub struct InMemoryCalendarStore {
    months: Mutex<HashMap<YearMonth, CalendarMonth>>,
    write_fault: Mutex<Option<String>>,
}

impl InMemoryCalendarStore {
    pub fn insert(&self, month: CalendarMonth) {
        self.months.lock().unwrap().insert(month.month, month);
    }

    pub fn month(&self, month: YearMonth) -> Option<CalendarMonth> {
        self.months.lock().unwrap().get(&month).cloned()
    }

    pub fn fail_writes(&self, message: &str) {
        *self.write_fault.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    fn get_month(&self, month: YearMonth) -> Result<Option<CalendarMonth>> {
        Ok(self.month(month))
    }

    async fn replace_month(&self, month: &CalendarMonth) -> Result<()> {
        if let Some(message) = self.write_fault.lock().unwrap().as_ref() {
            return Err(StorageError::Fault(message.clone()).into());
        }
        self.insert(month.clone());
        Ok(())
    }
}
