use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::{
    ExistsDB, NoDataIntervalDB, PriceRowDB, SymbolCacheMetadataDB, ALL_SYMBOLS_ID,
};
use super::partitions::{partition_table, PartitionRegistry};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCore, SqliteStorageError};
use crate::schema::no_data_intervals::dsl as nd_dsl;
use crate::schema::{no_data_intervals, symbol_cache_metadata, symbols};
use crate::utils::{chunk_rows_for_sqlite, date_to_key};
use pricecache_core::errors::{Error, Result};
use pricecache_core::prices::{
    merge_no_data, NoDataInterval, NoDataKey, PriceCacheStore, PricePoint, SymbolCacheMetadata,
};
use pricecache_core::RetryPolicy;

/// Bound parameters per row of a `prices_YYYY` insert.
const PRICE_PARAMS_PER_ROW: usize = 8;

/// SQLite-backed [`PriceCacheStore`].
///
/// Reads use pooled connections; every mutation goes through the shared
/// writer actor and is retried while the database reports busy.
pub struct SqlitePriceStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    partitions: PartitionRegistry,
    busy_retry: RetryPolicy<Error>,
}

impl SqlitePriceStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Result<Self> {
        let mut conn = get_connection(&pool)?;
        let partitions = PartitionRegistry::load(&mut conn)?;
        Ok(Self {
            pool,
            writer,
            partitions,
            busy_retry: RetryPolicy::storage_busy(),
        })
    }

    pub fn with_busy_retry(mut self, policy: RetryPolicy<Error>) -> Self {
        self.busy_retry = policy;
        self
    }

    /// Years that have a price partition, ascending.
    pub fn partition_years(&self) -> Vec<i32> {
        self.partitions.years()
    }
}

fn find_symbol_id(conn: &mut SqliteConnection, symbol: &str) -> Result<Option<i32>> {
    symbols::table
        .filter(symbols::symbol.eq(symbol))
        .select(symbols::id)
        .first::<i32>(conn)
        .optional()
        .into_core()
}

fn ensure_symbol_id(conn: &mut SqliteConnection, symbol: &str) -> Result<i32> {
    diesel::insert_or_ignore_into(symbols::table)
        .values(symbols::symbol.eq(symbol))
        .execute(conn)
        .into_core()?;
    symbols::table
        .filter(symbols::symbol.eq(symbol))
        .select(symbols::id)
        .first::<i32>(conn)
        .into_core()
}

fn find_key_id(conn: &mut SqliteConnection, key: &NoDataKey) -> Result<Option<i32>> {
    match key {
        NoDataKey::All => Ok(Some(ALL_SYMBOLS_ID)),
        NoDataKey::Symbol(symbol) => find_symbol_id(conn, symbol),
    }
}

fn ensure_key_id(conn: &mut SqliteConnection, key: &NoDataKey) -> Result<i32> {
    match key {
        NoDataKey::All => Ok(ALL_SYMBOLS_ID),
        NoDataKey::Symbol(symbol) => ensure_symbol_id(conn, symbol),
    }
}

fn load_intervals(
    conn: &mut SqliteConnection,
    key_id: i32,
    key: &NoDataKey,
) -> Result<Vec<NoDataInterval>> {
    nd_dsl::no_data_intervals
        .filter(nd_dsl::symbol_id.eq(key_id))
        .order(nd_dsl::start_date.asc())
        .select(NoDataIntervalDB::as_select())
        .load::<NoDataIntervalDB>(conn)
        .into_core()?
        .into_iter()
        .map(|row| row.into_domain(key.clone()))
        .collect()
}

fn insert_price_rows(
    conn: &mut SqliteConnection,
    table: &str,
    symbol_id: i32,
    rows: &[PriceRowDB],
) -> Result<usize> {
    let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?)"; rows.len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} (symbol_id, date, open, high, low, close, adj_close, volume) VALUES {}",
        table, placeholders
    );

    let mut query = diesel::sql_query(sql).into_boxed::<Sqlite>();
    for row in rows {
        query = query
            .bind::<Integer, _>(symbol_id)
            .bind::<Integer, _>(row.date)
            .bind::<Text, _>(row.open.clone())
            .bind::<Text, _>(row.high.clone())
            .bind::<Text, _>(row.low.clone())
            .bind::<Text, _>(row.close.clone())
            .bind::<Text, _>(row.adj_close.clone())
            .bind::<BigInt, _>(row.volume);
    }

    Ok(query.execute(conn).map_err(SqliteStorageError::from)?)
}

#[async_trait]
impl PriceCacheStore for SqlitePriceStore {
    async fn upsert(&self, symbol: &str, points: &[PricePoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut by_year: BTreeMap<i32, Vec<PriceRowDB>> = BTreeMap::new();
        for point in points {
            by_year
                .entry(point.date.year())
                .or_default()
                .push(PriceRowDB::from(point));
        }

        let mut batches = Vec::with_capacity(by_year.len());
        for (year, rows) in by_year {
            self.partitions
                .ensure(year, &self.writer, &self.busy_retry)
                .await?;
            batches.push((partition_table(year)?, rows));
        }

        let symbol_owned = symbol.to_string();
        let written = self
            .writer
            .exec_with_retry(&self.busy_retry, &format!("upsert {}", symbol), move |conn| {
                let symbol_id = ensure_symbol_id(conn, &symbol_owned)?;
                let mut written = 0;
                for (table, rows) in &batches {
                    for chunk in chunk_rows_for_sqlite(rows, PRICE_PARAMS_PER_ROW) {
                        written += insert_price_rows(conn, table, symbol_id, chunk)?;
                    }
                }
                Ok(written)
            })
            .await?;

        debug!("Upserted {} price rows for {}", written, symbol);
        Ok(written)
    }

    fn query(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        if start > end {
            return Ok(Vec::new());
        }
        let mut conn = get_connection(&self.pool)?;
        let Some(symbol_id) = find_symbol_id(&mut conn, symbol)? else {
            return Ok(Vec::new());
        };

        let mut points = Vec::new();
        for year in self.partitions.years_between(start.year(), end.year()) {
            let sql = format!(
                "SELECT date, open, high, low, close, adj_close, volume FROM {} \
                 WHERE symbol_id = ? AND date BETWEEN ? AND ? ORDER BY date",
                partition_table(year)?
            );
            let rows = diesel::sql_query(sql)
                .bind::<Integer, _>(symbol_id)
                .bind::<Integer, _>(date_to_key(start))
                .bind::<Integer, _>(date_to_key(end))
                .load::<PriceRowDB>(&mut conn)
                .map_err(SqliteStorageError::from)?;

            for row in rows {
                points.push(row.into_point(symbol)?);
            }
        }
        Ok(points)
    }

    fn has_any_data(&self, symbol: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let Some(symbol_id) = find_symbol_id(&mut conn, symbol)? else {
            return Ok(false);
        };

        for year in self.partitions.years().into_iter().rev() {
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE symbol_id = ?) AS present",
                partition_table(year)?
            );
            let probe = diesel::sql_query(sql)
                .bind::<Integer, _>(symbol_id)
                .get_result::<ExistsDB>(&mut conn)
                .map_err(SqliteStorageError::from)?;
            if probe.present != 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn record_no_data(
        &self,
        key: &NoDataKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NoDataInterval> {
        NoDataInterval::new(key.clone(), start, end)?;

        let key_owned = key.clone();
        let merged = self
            .writer
            .exec_with_retry(&self.busy_retry, &format!("record no-data {}", key), move |conn| {
                let key_id = ensure_key_id(conn, &key_owned)?;
                let existing = load_intervals(conn, key_id, &key_owned)?;
                let merge = merge_no_data(&existing, key_owned.clone(), start, end)?;
                if merge.is_noop() {
                    return Ok(merge.merged);
                }

                for interval in &merge.absorbed {
                    diesel::delete(
                        nd_dsl::no_data_intervals
                            .filter(nd_dsl::symbol_id.eq(key_id))
                            .filter(nd_dsl::start_date.eq(date_to_key(interval.start)))
                            .filter(nd_dsl::end_date.eq(date_to_key(interval.end))),
                    )
                    .execute(conn)
                    .into_core()?;
                }
                diesel::insert_into(no_data_intervals::table)
                    .values(&NoDataIntervalDB::new(key_id, &merge.merged))
                    .execute(conn)
                    .into_core()?;

                Ok(merge.merged)
            })
            .await?;

        debug!(
            "Recorded no-data for {} as [{}, {}]",
            key, merged.start, merged.end
        );
        Ok(merged)
    }

    fn is_no_data(&self, symbol: &str, date: NaiveDate) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let mut key_ids = vec![ALL_SYMBOLS_ID];
        if let Some(symbol_id) = find_symbol_id(&mut conn, symbol)? {
            key_ids.push(symbol_id);
        }

        let day = date_to_key(date);
        let matches: i64 = nd_dsl::no_data_intervals
            .filter(nd_dsl::symbol_id.eq_any(key_ids))
            .filter(nd_dsl::start_date.le(day))
            .filter(nd_dsl::end_date.ge(day))
            .count()
            .get_result(&mut conn)
            .into_core()?;
        Ok(matches > 0)
    }

    fn no_data_covers(&self, key: &NoDataKey, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let Some(key_id) = find_key_id(&mut conn, key)? else {
            return Ok(false);
        };

        let matches: i64 = nd_dsl::no_data_intervals
            .filter(nd_dsl::symbol_id.eq(key_id))
            .filter(nd_dsl::start_date.le(date_to_key(start)))
            .filter(nd_dsl::end_date.ge(date_to_key(end)))
            .count()
            .get_result(&mut conn)
            .into_core()?;
        Ok(matches > 0)
    }

    fn no_data_intervals(&self, key: &NoDataKey) -> Result<Vec<NoDataInterval>> {
        let mut conn = get_connection(&self.pool)?;
        match find_key_id(&mut conn, key)? {
            Some(key_id) => load_intervals(&mut conn, key_id, key),
            None => Ok(Vec::new()),
        }
    }

    fn get_metadata(&self, symbol: &str) -> Result<Option<SymbolCacheMetadata>> {
        let mut conn = get_connection(&self.pool)?;
        let Some(symbol_id) = find_symbol_id(&mut conn, symbol)? else {
            return Ok(None);
        };

        symbol_cache_metadata::table
            .find(symbol_id)
            .select(SymbolCacheMetadataDB::as_select())
            .first::<SymbolCacheMetadataDB>(&mut conn)
            .optional()
            .into_core()?
            .map(|row| row.into_domain(symbol))
            .transpose()
    }

    async fn save_metadata(&self, metadata: &SymbolCacheMetadata) -> Result<()> {
        let metadata_owned = metadata.clone();
        self.writer
            .exec_with_retry(
                &self.busy_retry,
                &format!("save metadata {}", metadata.symbol),
                move |conn| {
                    let symbol_id = ensure_symbol_id(conn, &metadata_owned.symbol)?;
                    diesel::replace_into(symbol_cache_metadata::table)
                        .values(&SymbolCacheMetadataDB::new(symbol_id, &metadata_owned))
                        .execute(conn)
                        .into_core()?;
                    Ok(())
                },
            )
            .await
    }
}
