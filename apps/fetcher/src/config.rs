use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use pricecache_core::constants::DEFAULT_CONCURRENCY;

/// Days fetched when `PC_START` is not set.
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

pub struct Config {
    pub db_path: String,
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub reference_symbol: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let db_path = lookup("PC_DB_PATH").unwrap_or_else(|| "./db/prices.db".into());

        let symbols: Vec<String> = lookup("PC_SYMBOLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            bail!("PC_SYMBOLS must list at least one symbol");
        }

        let end = match lookup("PC_END") {
            Some(value) => parse_date("PC_END", &value)?,
            None => Utc::now().date_naive(),
        };
        let start = match lookup("PC_START") {
            Some(value) => parse_date("PC_START", &value)?,
            None => end - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS),
        };
        if start > end {
            bail!("PC_START {} is after PC_END {}", start, end);
        }

        let concurrency = match lookup("PC_CONCURRENCY") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid PC_CONCURRENCY: {}", value))?,
            None => DEFAULT_CONCURRENCY,
        };
        if concurrency == 0 {
            bail!("PC_CONCURRENCY must be at least 1");
        }

        let deadline = lookup("PC_DEADLINE_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid PC_DEADLINE_SECS: {}", value))
            })
            .transpose()?;

        let reference_symbol = lookup("PC_REFERENCE_SYMBOL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            db_path,
            symbols,
            start,
            end,
            concurrency,
            deadline,
            reference_symbol,
        })
    }
}

fn parse_date(name: &str, value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid {} (expected YYYY-MM-DD): {}", name, value))
}
