//! End-to-end runs of the fetch orchestrator against a SQLite cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use pricecache_core::calendar::{CalendarConfig, CalendarMonth, CalendarStore, TradingCalendarOracle, YearMonth};
use pricecache_core::clock::fixed_clock;
use pricecache_core::fetch::SymbolOutcome;
use pricecache_core::prices::{NoDataKey, PriceCacheStore};
use pricecache_core::{FailureCategory, FetchOrchestrator, OrchestratorConfig, RetryPolicy};
use pricecache_market_data::{DailyBar, UpstreamClient, UpstreamError, DEFAULT_REFERENCE_SYMBOL};
use pricecache_storage_sqlite::db::spawn_writer;
use pricecache_storage_sqlite::{create_pool, init, run_migrations, SqliteCalendarStore, SqlitePriceStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, day).unwrap()
}

/// Friday 2024-03-15, after the close.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 22, 0, 0).unwrap()
}

fn weekday_bars(start: NaiveDate, end: NaiveDate, close: Decimal) -> Vec<DailyBar> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .map(|day| DailyBar::new(day, close, close + dec!(2), close - dec!(2), close, 50_000_000))
        .collect()
}

/// Serves fixed series and records every call.
#[derive(Default)]
struct ScriptedUpstream {
    series: Mutex<HashMap<String, Vec<DailyBar>>>,
    parse_failures: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    fn with_reference_calendar() -> Self {
        let upstream = Self::default();
        let sessions = weekday_bars(NaiveDate::from_ymd_opt(2023, 11, 1).unwrap(), d(3, 15), dec!(4800))
            .into_iter()
            .filter(|bar| bar.date != d(1, 1))
            .collect();
        upstream.set_series(DEFAULT_REFERENCE_SYMBOL, sessions);
        upstream
    }

    fn set_series(&self, symbol: &str, bars: Vec<DailyBar>) {
        self.series.lock().unwrap().insert(symbol.to_string(), bars);
    }

    fn fail_to_parse(&self, symbol: &str) {
        self.parse_failures.lock().unwrap().push(symbol.to_string());
    }

    fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| *s == symbol).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, UpstreamError> {
        self.calls.lock().unwrap().push(symbol.to_string());
        if self.parse_failures.lock().unwrap().iter().any(|s| s == symbol) {
            return Err(UpstreamError::parse(symbol, "chart payload had no timestamps"));
        }
        match self.series.lock().unwrap().get(symbol) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|bar| bar.date >= start && bar.date <= end)
                .cloned()
                .collect()),
            None => Err(UpstreamError::NotFound(symbol.to_string())),
        }
    }
}

struct Harness {
    upstream: Arc<ScriptedUpstream>,
    prices: Arc<SqlitePriceStore>,
    calendar: Arc<SqliteCalendarStore>,
    orchestrator: FetchOrchestrator,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("cache").join("prices.db").to_string_lossy().to_string();
    init(&db_path).expect("Failed to init database");
    let pool = create_pool(&db_path).expect("Failed to create pool");
    run_migrations(&pool).expect("Failed to run migrations");
    let writer = spawn_writer((*pool).clone());

    let busy_retry = RetryPolicy::storage_busy().without_delays();
    let prices = Arc::new(
        SqlitePriceStore::new(Arc::clone(&pool), writer.clone())
            .expect("Failed to open price store")
            .with_busy_retry(busy_retry.clone()),
    );
    let calendar = Arc::new(SqliteCalendarStore::new(pool, writer).with_busy_retry(busy_retry));
    let upstream = Arc::new(ScriptedUpstream::with_reference_calendar());

    let oracle = TradingCalendarOracle::new(
        upstream.clone(),
        calendar.clone(),
        prices.clone(),
        CalendarConfig {
            refresh_retry: RetryPolicy::calendar_refresh().without_delays(),
            ..CalendarConfig::default()
        },
    )
    .with_clock(fixed_clock(now()));

    let orchestrator = FetchOrchestrator::new(
        upstream.clone(),
        prices.clone(),
        Arc::new(oracle),
        OrchestratorConfig {
            second_pass_delay: (StdDuration::ZERO, StdDuration::ZERO),
            fetch_retry: RetryPolicy::upstream_fetch().without_delays(),
            ..OrchestratorConfig::default()
        },
    )
    .with_clock(fixed_clock(now()));

    Harness {
        upstream,
        prices,
        calendar,
        orchestrator,
        _dir: dir,
    }
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_valid_and_invalid_symbol_end_to_end() {
    let h = harness();
    h.upstream.set_series("AAPL", weekday_bars(d(2, 1), d(2, 29), dec!(182.31)));
    h.upstream.fail_to_parse("ZZZZ_INVALID");

    let outcome = h
        .orchestrator
        .run(&symbols(&["AAPL", "ZZZZ_INVALID"]), d(2, 1), d(2, 29))
        .await
        .unwrap();

    let stored = h.prices.query("AAPL", d(2, 1), d(2, 29)).unwrap();
    assert_eq!(stored.len(), 21);
    assert_eq!(stored.first().map(|p| p.date), Some(d(2, 1)));
    assert_eq!(stored.last().map(|p| p.date), Some(d(2, 29)));
    assert_eq!(stored[0].close, dec!(182.31));

    assert_eq!(outcome.succeeded, vec!["AAPL".to_string()]);
    assert_eq!(outcome.failures.len(), 1);
    let entries = outcome.failures.entries(FailureCategory::ParseError);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].symbol, "ZZZZ_INVALID");
    assert_eq!(h.upstream.calls_for("ZZZZ_INVALID"), 2);

    let metadata = h.prices.get_metadata("AAPL").unwrap().unwrap();
    assert_eq!((metadata.cached_start, metadata.cached_end), (d(2, 1), d(2, 29)));
    assert!(h.prices.get_metadata("ZZZZ_INVALID").unwrap().is_none());
}

#[tokio::test]
async fn test_second_run_is_served_from_sqlite() {
    let h = harness();
    h.upstream.set_series("MSFT", weekday_bars(d(2, 1), d(2, 29), dec!(410)));

    let first = h
        .orchestrator
        .run(&symbols(&["MSFT"]), d(2, 1), d(2, 29))
        .await
        .unwrap();
    assert_eq!(first.outcome("MSFT"), Some(&SymbolOutcome::Fetched { rows: 21 }));
    assert_eq!(h.upstream.calls_for("MSFT"), 1);

    let second = h
        .orchestrator
        .run(&symbols(&["MSFT"]), d(2, 1), d(2, 29))
        .await
        .unwrap();
    assert_eq!(second.outcome("MSFT"), Some(&SymbolOutcome::CacheHit));
    assert_eq!(second.succeeded, vec!["MSFT".to_string()]);
    assert_eq!(h.upstream.calls_for("MSFT"), 1);
}

#[tokio::test]
async fn test_unknown_symbol_is_recorded_as_no_data() {
    let h = harness();

    let outcome = h
        .orchestrator
        .run(&symbols(&["GONE"]), d(2, 1), d(2, 29))
        .await
        .unwrap();

    assert_eq!(outcome.outcome("GONE"), Some(&SymbolOutcome::NoData));
    assert!(outcome.failures.is_empty());
    assert!(h.prices.is_no_data("GONE", d(2, 14)).unwrap());
    assert!(h
        .prices
        .no_data_covers(&NoDataKey::symbol("GONE"), d(2, 1), d(2, 29))
        .unwrap());
    assert!(!h.prices.has_any_data("GONE").unwrap());

    // Confirmed absence is not asked for again.
    h.orchestrator
        .run(&symbols(&["GONE"]), d(2, 1), d(2, 29))
        .await
        .unwrap();
    assert_eq!(h.upstream.calls_for("GONE"), 1);
}

#[tokio::test]
async fn test_stored_calendar_answers_without_upstream() {
    let h = harness();
    let january = YearMonth::new(2024, 1).unwrap();
    let sessions = weekday_bars(d(1, 2), d(1, 31), dec!(4800))
        .into_iter()
        .map(|bar| bar.date);
    h.calendar
        .replace_month(&CalendarMonth::from_sessions(january, sessions, now() - Duration::days(1)))
        .await
        .unwrap();

    let oracle = TradingCalendarOracle::new(
        h.upstream.clone(),
        h.calendar.clone(),
        h.prices.clone(),
        CalendarConfig::default(),
    )
    .with_clock(fixed_clock(now()));

    // New Year's Day, a Saturday, and a regular session.
    assert!(!oracle.is_trading_day(d(1, 1)).await.unwrap());
    assert!(!oracle.is_trading_day(d(1, 6)).await.unwrap());
    assert!(oracle.is_trading_day(d(1, 2)).await.unwrap());
    assert!(!oracle.date_range_has_trading_day(d(1, 1), d(1, 1)).await.unwrap());
    assert_eq!(h.upstream.total_calls(), 0);
}
