//! Batch outcome and failure report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use pricecache_market_data::UpstreamError;
use serde::{Deserialize, Serialize};

/// Why a symbol ended the run without cache coverage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    RateLimited,
    ParseError,
    Transient,
    /// A non-fatal store error (busy read, undecodable row).
    Storage,
    /// Never started before the run deadline.
    Cancelled,
}

impl FailureCategory {
    /// Report category for an upstream error that exhausted its retries.
    ///
    /// `NotFound` is recorded as no-data and never reported; it lands in
    /// `ParseError` only if a caller reports it anyway.
    pub fn from_upstream(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::RateLimited { .. } => FailureCategory::RateLimited,
            UpstreamError::NotFound(_) | UpstreamError::ParseError { .. } => {
                FailureCategory::ParseError
            }
            UpstreamError::Transient(_) | UpstreamError::Network(_) => FailureCategory::Transient,
        }
    }

    /// Worth another pass.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureCategory::Cancelled)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCategory::RateLimited => "RATE_LIMITED",
            FailureCategory::ParseError => "PARSE_ERROR",
            FailureCategory::Transient => "TRANSIENT",
            FailureCategory::Storage => "STORAGE",
            FailureCategory::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub symbol: String,
    pub message: String,
}

/// Unresolved failures grouped by category. A symbol appears at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureReport {
    entries: BTreeMap<FailureCategory, Vec<FailureEntry>>,
}

impl FailureReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a failure, replacing any earlier entry for the same symbol.
    pub fn add(&mut self, category: FailureCategory, symbol: &str, message: impl Into<String>) {
        self.remove(symbol);
        self.entries
            .entry(category)
            .or_default()
            .push(FailureEntry {
                symbol: symbol.to_string(),
                message: message.into(),
            });
    }

    pub fn remove(&mut self, symbol: &str) {
        for entries in self.entries.values_mut() {
            entries.retain(|e| e.symbol != symbol);
        }
        self.entries.retain(|_, entries| !entries.is_empty());
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.category_of(symbol).is_some()
    }

    pub fn category_of(&self, symbol: &str) -> Option<FailureCategory> {
        self.entries
            .iter()
            .find(|(_, entries)| entries.iter().any(|e| e.symbol == symbol))
            .map(|(category, _)| *category)
    }

    pub fn entries(&self, category: FailureCategory) -> &[FailureEntry] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn categories(&self) -> impl Iterator<Item = (&FailureCategory, &Vec<FailureEntry>)> {
        self.entries.iter()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.entries
            .values()
            .flatten()
            .map(|e| e.symbol.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How one symbol ended the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SymbolOutcome {
    /// Fetched from upstream and stored.
    Fetched { rows: usize },
    /// Served from the cache, no upstream call.
    CacheHit,
    /// Upstream confirmed there is nothing in the window.
    NoData,
    Failed { category: FailureCategory },
}

impl SymbolOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SymbolOutcome::Failed { .. })
    }
}

/// One symbol's unit of work within a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTask {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Upstream calls made across both passes.
    pub attempts: u32,
    pub outcome: Option<SymbolOutcome>,
}

impl FetchTask {
    pub fn new(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            start,
            end,
            attempts: 0,
            outcome: None,
        }
    }
}

/// Everything a run produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Symbols with cache coverage at the end of the run, sorted.
    pub succeeded: Vec<String>,
    pub failures: FailureReport,
    pub tasks: BTreeMap<String, FetchTask>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.tasks.get(symbol).and_then(|t| t.outcome.as_ref())
    }

    pub fn count(&self, predicate: impl Fn(&SymbolOutcome) -> bool) -> usize {
        self.tasks
            .values()
            .filter_map(|t| t.outcome.as_ref())
            .filter(|o| predicate(o))
            .count()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let fetched = self.count(|o| matches!(o, SymbolOutcome::Fetched { .. }));
        let hits = self.count(|o| matches!(o, SymbolOutcome::CacheHit));
        let no_data = self.count(|o| matches!(o, SymbolOutcome::NoData));
        let rows: usize = self
            .tasks
            .values()
            .filter_map(|t| match t.outcome {
                Some(SymbolOutcome::Fetched { rows }) => Some(rows),
                _ => None,
            })
            .sum();
        format!(
            "{} symbols: {} fetched ({} rows), {} cache hits, {} no data, {} failed in {}s",
            self.tasks.len(),
            fetched,
            rows,
            hits,
            no_data,
            self.failures.len(),
            self.finished_at
                .signed_duration_since(self.started_at)
                .num_seconds()
        )
    }
}
