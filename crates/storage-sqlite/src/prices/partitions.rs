//! Year partitions of the price table.
//!
//! Each calendar year lives in its own `prices_YYYY` table, created the first
//! time a point for that year is written. The registry remembers which
//! partitions exist so reads skip missing years without touching the schema,
//! and serializes creation of each year behind its own gate.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use pricecache_core::errors::{Error, Result, ValidationError};
use pricecache_core::RetryPolicy;
use tokio::sync::Mutex as AsyncMutex;

use super::model::TableNameDB;
use crate::db::WriteHandle;
use crate::errors::SqliteStorageError;

const PARTITION_PREFIX: &str = "prices_";

/// Table name for a year's partition.
pub fn partition_table(year: i32) -> Result<String> {
    if !(1..=9999).contains(&year) {
        return Err(ValidationError::InvalidInput(format!(
            "Year {} is outside the supported partition range",
            year
        ))
        .into());
    }
    Ok(format!("{}{:04}", PARTITION_PREFIX, year))
}

fn partition_year(table: &str) -> Option<i32> {
    let suffix = table.strip_prefix(PARTITION_PREFIX)?;
    if suffix.len() != 4 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

fn create_partition_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            symbol_id INTEGER NOT NULL,
            date INTEGER NOT NULL,
            open TEXT NOT NULL,
            high TEXT NOT NULL,
            low TEXT NOT NULL,
            close TEXT NOT NULL,
            adj_close TEXT NOT NULL,
            volume BIGINT NOT NULL,
            PRIMARY KEY (symbol_id, date)
        ) WITHOUT ROWID",
        table
    )
}

/// Known `prices_YYYY` partitions plus per-year creation gates.
#[derive(Default)]
pub struct PartitionRegistry {
    known: Mutex<BTreeSet<i32>>,
    gates: Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>,
}

impl PartitionRegistry {
    /// Build the registry from the partitions already in the database.
    pub fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let tables = diesel::sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'prices\\_%' ESCAPE '\\'",
        )
        .load::<TableNameDB>(conn)
        .map_err(SqliteStorageError::from)?;

        let years: BTreeSet<i32> = tables
            .iter()
            .filter_map(|t| partition_year(&t.name))
            .collect();
        debug!("Found {} price partitions", years.len());

        Ok(Self {
            known: Mutex::new(years),
            gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn contains(&self, year: i32) -> bool {
        lock(&self.known).contains(&year)
    }

    /// Existing partitions in `[from, to]`, ascending.
    pub fn years_between(&self, from: i32, to: i32) -> Vec<i32> {
        if from > to {
            return Vec::new();
        }
        lock(&self.known).range(from..=to).copied().collect()
    }

    pub fn years(&self) -> Vec<i32> {
        lock(&self.known).iter().copied().collect()
    }

    /// Create the partition for `year` unless it already exists.
    ///
    /// Concurrent callers for the same year wait on that year's gate; only the
    /// first one issues the DDL.
    pub async fn ensure(
        &self,
        year: i32,
        writer: &WriteHandle,
        busy_retry: &RetryPolicy<Error>,
    ) -> Result<()> {
        if self.contains(year) {
            return Ok(());
        }
        let table = partition_table(year)?;

        let gate = self.gate(year);
        let _guard = gate.lock().await;
        if self.contains(year) {
            return Ok(());
        }

        let sql = create_partition_sql(&table);
        writer
            .exec_with_retry(busy_retry, &format!("create {}", table), move |conn| {
                diesel::sql_query(sql.as_str())
                    .execute(conn)
                    .map_err(SqliteStorageError::from)?;
                Ok(())
            })
            .await?;

        info!("Created price partition {}", table);
        lock(&self.known).insert(year);
        Ok(())
    }

    fn gate(&self, year: i32) -> Arc<AsyncMutex<()>> {
        lock(&self.gates)
            .entry(year)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_table_names() {
        assert_eq!(partition_table(2024).unwrap(), "prices_2024");
        assert_eq!(partition_table(987).unwrap(), "prices_0987");
        assert!(partition_table(0).is_err());
        assert!(partition_table(10_000).is_err());
    }

    #[test]
    fn test_partition_year_parsing() {
        assert_eq!(partition_year("prices_2024"), Some(2024));
        assert_eq!(partition_year("prices_20x4"), None);
        assert_eq!(partition_year("prices_backup"), None);
        assert_eq!(partition_year("symbols"), None);
    }

    #[test]
    fn test_years_between_only_returns_known() {
        let registry = PartitionRegistry::default();
        lock(&registry.known).extend([2021, 2023, 2024]);
        assert_eq!(registry.years_between(2022, 2024), vec![2023, 2024]);
        assert!(registry.years_between(2025, 2026).is_empty());
    }
}
