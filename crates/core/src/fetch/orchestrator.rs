//! Bounded-concurrency batch fetcher.
//!
//! ```text
//! run(symbols, start, end)
//!   │
//!   ├─ latest_completed_trading_day()          (oracle)
//!   ├─ pass 1: per symbol, under the semaphore
//!   │     metadata ─▶ plan ─▶ hit? ─▶ done
//!   │                       └─▶ no-data / no session? ─▶ done
//!   │                       └─▶ fetch (retry) ─▶ upsert | record_no_data
//!   ├─ join barrier
//!   ├─ pass 2: failed symbols once more, each after a random delay
//!   └─ FailureReport from what is still failing
//! ```
//!
//! Upstream failures are per-symbol and never stop the batch. Neither do
//! non-fatal store errors (a busy read, an undecodable row): the symbol is
//! reported under `STORAGE`. A storage fault stops new symbols from starting
//! and the run returns the error.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use log::{debug, error, info, warn};
use pricecache_market_data::{UpstreamClient, UpstreamError};
use tokio::sync::Semaphore;

use super::planning::{plan_symbol, FetchDecision, PlanContext};
use super::report::{BatchOutcome, FailureCategory, FailureReport, FetchTask, SymbolOutcome};
use crate::calendar::TradingCalendarOracle;
use crate::clock::{system_clock, Clock};
use crate::constants::{
    DEFAULT_CONCURRENCY, FRESHNESS_WINDOW_HOURS, INCREMENTAL_OVERLAP_DAYS,
    SECOND_PASS_DELAY_MAX_MS, SECOND_PASS_DELAY_MIN_MS,
};
use crate::errors::{Error, Result, ValidationError};
use crate::prices::{NoDataKey, PriceCacheStore, PricePoint, SymbolCacheMetadata};
use crate::retry::{random_between, RetryPolicy};

/// Orchestrator settings.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Symbols processed at once.
    pub concurrency: usize,
    /// How long fetched metadata counts as current.
    pub freshness_window: Duration,
    /// Random delay before each second-pass symbol, `(min, max)`.
    pub second_pass_delay: (StdDuration, StdDuration),
    /// Symbols not started by then are reported as cancelled.
    pub deadline: Option<StdDuration>,
    pub fetch_retry: RetryPolicy<UpstreamError>,
    pub incremental_overlap_days: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            freshness_window: Duration::hours(FRESHNESS_WINDOW_HOURS),
            second_pass_delay: (
                StdDuration::from_millis(SECOND_PASS_DELAY_MIN_MS),
                StdDuration::from_millis(SECOND_PASS_DELAY_MAX_MS),
            ),
            deadline: None,
            fetch_retry: RetryPolicy::upstream_fetch(),
            incremental_overlap_days: INCREMENTAL_OVERLAP_DAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    First,
    Second,
}

/// Shared state of one run.
struct RunState {
    ctx: PlanContext,
    start: NaiveDate,
    end: NaiveDate,
    deadline: Option<Instant>,
    aborted: AtomicBool,
}

impl RunState {
    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// What one attempt at a symbol produced.
struct SymbolResult {
    outcome: SymbolOutcome,
    message: Option<String>,
    attempts: u32,
}

impl SymbolResult {
    fn done(outcome: SymbolOutcome, attempts: u32) -> Self {
        Self {
            outcome,
            message: None,
            attempts,
        }
    }

    fn failed(category: FailureCategory, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            outcome: SymbolOutcome::Failed { category },
            message: Some(message.into()),
            attempts,
        }
    }
}

/// Batch runner over a shared store, oracle and upstream client.
pub struct FetchOrchestrator {
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<dyn PriceCacheStore>,
    oracle: Arc<TradingCalendarOracle>,
    config: OrchestratorConfig,
    clock: Clock,
}

impl FetchOrchestrator {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<dyn PriceCacheStore>,
        oracle: Arc<TradingCalendarOracle>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            upstream,
            store,
            oracle,
            config,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Bring the cache up to date for `symbols` over `[start, end]`.
    pub async fn run(&self, symbols: &[String], start: NaiveDate, end: NaiveDate) -> Result<BatchOutcome> {
        self.run_with(symbols, start, end, self.config.concurrency).await
    }

    /// Like [`run`](Self::run) with a per-run concurrency.
    pub async fn run_with(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        concurrency: usize,
    ) -> Result<BatchOutcome> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end }.into());
        }
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }

        let started_at = (self.clock)();
        let symbols = normalize_symbols(symbols);
        info!(
            "Starting batch of {} symbols for {} to {} (concurrency {})",
            symbols.len(),
            start,
            end,
            concurrency
        );

        let latest_trading_day = self.oracle.latest_completed_trading_day().await?;
        debug!("Latest completed session: {}", latest_trading_day);

        let state = RunState {
            ctx: PlanContext {
                latest_trading_day,
                now: started_at,
                freshness_window: self.config.freshness_window,
                incremental_overlap_days: self.config.incremental_overlap_days,
            },
            start,
            end,
            deadline: self.config.deadline.map(|d| Instant::now() + d),
            aborted: AtomicBool::new(false),
        };
        let semaphore = Semaphore::new(concurrency);
        let mut tasks: BTreeMap<String, FetchTask> = symbols
            .iter()
            .map(|s| (s.clone(), FetchTask::new(s, start, end)))
            .collect();
        let mut messages: HashMap<String, String> = HashMap::new();

        let first = self.run_pass(&symbols, Pass::First, &state, &semaphore).await;
        let retry = absorb_results(first, Pass::First, &mut tasks, &mut messages)?;
        info!(
            "Pass 1 finished: {} of {} symbols need another attempt",
            retry.len(),
            symbols.len()
        );

        if !retry.is_empty() {
            let second = self.run_pass(&retry, Pass::Second, &state, &semaphore).await;
            absorb_results(second, Pass::Second, &mut tasks, &mut messages)?;
        }

        let mut failures = FailureReport::new();
        let mut succeeded = Vec::new();
        for (symbol, task) in &tasks {
            match &task.outcome {
                Some(SymbolOutcome::Failed { category }) => {
                    let message = messages.get(symbol).cloned().unwrap_or_default();
                    warn!("{} failed ({}): {}", symbol, category, message);
                    failures.add(*category, symbol, message);
                }
                Some(_) => succeeded.push(symbol.clone()),
                None => {
                    error!("{} finished the run without an outcome", symbol);
                    failures.add(FailureCategory::Cancelled, symbol, "no outcome recorded");
                }
            }
        }

        let outcome = BatchOutcome {
            succeeded,
            failures,
            tasks,
            started_at,
            finished_at: (self.clock)(),
        };
        info!("Batch finished: {}", outcome.summary());
        Ok(outcome)
    }

    async fn run_pass(
        &self,
        symbols: &[String],
        pass: Pass,
        state: &RunState,
        semaphore: &Semaphore,
    ) -> Vec<(String, Result<SymbolResult>)> {
        let work = symbols.iter().map(|symbol| async move {
            if pass == Pass::Second {
                let (min, max) = self.config.second_pass_delay;
                let delay = random_between(min, max);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    let result = SymbolResult::failed(FailureCategory::Cancelled, "fetch pool closed", 0);
                    return (symbol.clone(), Ok(result));
                }
            };

            if state.aborted.load(Ordering::SeqCst) {
                let result = SymbolResult::failed(FailureCategory::Cancelled, "run aborted", 0);
                return (symbol.clone(), Ok(result));
            }
            if state.past_deadline() {
                debug!("Deadline reached before {} started", symbol);
                let result = SymbolResult::failed(
                    FailureCategory::Cancelled,
                    "deadline reached before the fetch started",
                    0,
                );
                return (symbol.clone(), Ok(result));
            }

            let result = match self.process_symbol(symbol, state).await {
                Err(e) if e.is_fatal() => {
                    state.aborted.store(true, Ordering::SeqCst);
                    Err(e)
                }
                Err(e) => {
                    warn!("Store error while processing {}: {}", symbol, e);
                    Ok(SymbolResult::failed(FailureCategory::Storage, e.to_string(), 0))
                }
                ok => ok,
            };
            (symbol.clone(), result)
        });

        join_all(work).await
    }

    /// cache read → upstream call → cache write, for one symbol.
    async fn process_symbol(&self, symbol: &str, state: &RunState) -> Result<SymbolResult> {
        let metadata = self.store.get_metadata(symbol)?;

        match plan_symbol(metadata.as_ref(), state.start, state.end, &state.ctx) {
            FetchDecision::CacheHit => {
                debug!("Cache hit for {}", symbol);
                // Without metadata there is no cached range to restamp.
                if let Some(mut meta) = metadata {
                    meta.last_known_trading_date = state.ctx.latest_trading_day;
                    self.store.save_metadata(&meta).await?;
                }
                Ok(SymbolResult::done(SymbolOutcome::CacheHit, 0))
            }
            FetchDecision::Fetch { start, end } => {
                self.fetch_window(symbol, metadata, start, end, state).await
            }
        }
    }

    async fn fetch_window(
        &self,
        symbol: &str,
        metadata: Option<SymbolCacheMetadata>,
        start: NaiveDate,
        end: NaiveDate,
        state: &RunState,
    ) -> Result<SymbolResult> {
        let key = NoDataKey::symbol(symbol);
        if self.store.no_data_covers(&key, start, end)?
            || self.store.no_data_covers(&NoDataKey::All, start, end)?
        {
            debug!("{} has no data for {} to {}", symbol, start, end);
            self.save_coverage(symbol, metadata, start, end, state).await?;
            return Ok(SymbolResult::done(SymbolOutcome::NoData, 0));
        }

        match self.oracle.date_range_has_trading_day(start, end).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("No session between {} and {}, skipping {}", start, end, symbol);
                self.save_coverage(symbol, metadata, start, end, state).await?;
                return Ok(SymbolResult::done(SymbolOutcome::CacheHit, 0));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Calendar check failed for {}, fetching anyway: {}", symbol, e),
        }

        debug!("Fetching {} from {} to {}", symbol, start, end);
        let label = format!("fetch {}", symbol);
        let (result, attempts) = self
            .config
            .fetch_retry
            .execute_counted(&label, || self.upstream.fetch_series(symbol, start, end))
            .await;

        let bars = match result {
            Ok(bars) => bars,
            Err(e) if e.is_not_found() => {
                info!("{} not found upstream for {} to {}", symbol, start, end);
                let outcome = self.record_absence(symbol, &key, start, end).await?;
                self.save_coverage(symbol, metadata, start, end, state).await?;
                return Ok(SymbolResult::done(outcome, attempts));
            }
            Err(e) => {
                let category = FailureCategory::from_upstream(&e);
                return Ok(SymbolResult::failed(category, e.to_string(), attempts));
            }
        };

        if bars.is_empty() {
            debug!("Upstream returned no rows for {} between {} and {}", symbol, start, end);
            let outcome = self.record_absence(symbol, &key, start, end).await?;
            self.save_coverage(symbol, metadata, start, end, state).await?;
            return Ok(SymbolResult::done(outcome, attempts));
        }

        let total = bars.len();
        let points: Vec<PricePoint> = bars
            .into_iter()
            .map(|bar| PricePoint::from_bar(symbol, bar))
            .filter(|point| match point.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping row: {}", e);
                    false
                }
            })
            .collect();
        if points.is_empty() {
            return Ok(SymbolResult::failed(
                FailureCategory::ParseError,
                format!("all {} rows failed validation", total),
                attempts,
            ));
        }

        let rows = self.store.upsert(symbol, &points).await?;
        self.save_coverage(symbol, metadata, start, end, state).await?;
        debug!("Stored {} rows for {}", rows, symbol);
        Ok(SymbolResult::done(SymbolOutcome::Fetched { rows }, attempts))
    }

    /// Record confirmed absence for the part of `[start, end]` after the last
    /// stored row, so dates that already hold prices are never marked absent.
    async fn record_absence(
        &self,
        symbol: &str,
        key: &NoDataKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SymbolOutcome> {
        let last_stored = if self.store.has_any_data(symbol)? {
            self.store.query(symbol, start, end)?.last().map(|p| p.date)
        } else {
            None
        };

        let Some(last_stored) = last_stored else {
            self.store.record_no_data(key, start, end).await?;
            return Ok(SymbolOutcome::NoData);
        };

        let absent_from = last_stored + Duration::days(1);
        if absent_from <= end {
            debug!("Recording no data for {} from {} to {}", symbol, absent_from, end);
            self.store.record_no_data(key, absent_from, end).await?;
        }
        Ok(SymbolOutcome::Fetched { rows: 0 })
    }

    /// Record that `[start, end]` is now covered for `symbol`.
    async fn save_coverage(
        &self,
        symbol: &str,
        metadata: Option<SymbolCacheMetadata>,
        start: NaiveDate,
        end: NaiveDate,
        state: &RunState,
    ) -> Result<()> {
        let now = (self.clock)();
        let latest = state.ctx.latest_trading_day;
        let mut meta = metadata
            .unwrap_or_else(|| SymbolCacheMetadata::new(symbol, now, start, end, latest));
        meta.absorb_window(start, end, now);
        meta.last_known_trading_date = latest;
        self.store.save_metadata(&meta).await
    }
}

/// Fold a pass's results into the run. Returns the symbols worth retrying, or
/// the first fatal error.
fn absorb_results(
    results: Vec<(String, Result<SymbolResult>)>,
    pass: Pass,
    tasks: &mut BTreeMap<String, FetchTask>,
    messages: &mut HashMap<String, String>,
) -> Result<Vec<String>> {
    let mut retry = Vec::new();
    let mut fatal: Option<Error> = None;

    for (symbol, result) in results {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                if fatal.is_none() {
                    fatal = Some(e);
                }
                continue;
            }
        };
        let Some(task) = tasks.get_mut(&symbol) else {
            continue;
        };

        // A second pass that never started keeps the first pass's failure.
        let cancelled = matches!(
            result.outcome,
            SymbolOutcome::Failed {
                category: FailureCategory::Cancelled
            }
        );
        if pass == Pass::Second && cancelled && task.outcome.is_some() {
            continue;
        }

        task.attempts += result.attempts;
        match (&result.outcome, result.message) {
            (SymbolOutcome::Failed { category }, message) => {
                messages.insert(symbol.clone(), message.unwrap_or_default());
                if pass == Pass::First && category.is_retryable() {
                    retry.push(symbol.clone());
                }
            }
            _ => {
                messages.remove(&symbol);
            }
        }
        task.outcome = Some(result.outcome);
    }

    match fatal {
        Some(e) => {
            error!("Aborting batch after a storage fault: {}", e);
            Err(e)
        }
        None => Ok(retry),
    }
}

/// Trim, drop empties and collapse duplicates, keeping first-seen order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}
