use std::sync::Arc;

use crate::config::Config;
use pricecache_core::{
    BatchOutcome, CalendarConfig, FetchOrchestrator, OrchestratorConfig, TradingCalendarOracle,
};
use pricecache_market_data::{UpstreamClient, YahooClient};
use pricecache_storage_sqlite::db::{self, write_actor};
use pricecache_storage_sqlite::{SqliteCalendarStore, SqlitePriceStore};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing() {
    let log_format = std::env::var("PC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Open the cache database and wire the oracle and orchestrator on top of it.
pub fn build_orchestrator(config: &Config) -> anyhow::Result<FetchOrchestrator> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = write_actor::spawn_writer((*pool).clone());

    let prices = Arc::new(SqlitePriceStore::new(Arc::clone(&pool), writer.clone())?);
    let calendar = Arc::new(SqliteCalendarStore::new(pool, writer));
    let upstream: Arc<dyn UpstreamClient> = Arc::new(YahooClient::new()?);

    let oracle = TradingCalendarOracle::new(
        upstream.clone(),
        calendar,
        prices.clone(),
        CalendarConfig {
            reference_symbol: config.reference_symbol.clone(),
            ..CalendarConfig::default()
        },
    );

    Ok(FetchOrchestrator::new(
        upstream,
        prices,
        Arc::new(oracle),
        OrchestratorConfig {
            concurrency: config.concurrency,
            deadline: config.deadline,
            ..OrchestratorConfig::default()
        },
    ))
}

pub async fn run_batch(config: &Config) -> anyhow::Result<BatchOutcome> {
    let orchestrator = build_orchestrator(config)?;
    let outcome = orchestrator
        .run(&config.symbols, config.start, config.end)
        .await?;

    tracing::info!("{}", outcome.summary());
    for (category, entries) in outcome.failures.categories() {
        for entry in entries {
            tracing::warn!("{} {}: {}", category, entry.symbol, entry.message);
        }
    }
    Ok(outcome)
}
