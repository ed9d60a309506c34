//! Utility functions for SQLite storage operations.
//!
//! Dates are stored as `YYYYMMDD` integers and calendar months as `YYYYMM`;
//! timestamps as RFC 3339 text. Chunking helpers keep statements under
//! SQLite's bound-parameter limit.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use pricecache_core::errors::{Result, ValidationError};

/// Maximum number of bound parameters per statement.
///
/// SQLite has a compile-time limit on the number of parameters in a SQL statement,
/// typically around 999 (SQLITE_MAX_VARIABLE_NUMBER). To stay safely under this limit
/// and leave room for other parameters in the query, we use 500 as our chunk size.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Chunk a slice into smaller slices for batch SQLite queries.
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

/// Chunk rows for multi-row `VALUES (...), (...)` statements binding
/// `params_per_row` parameters each.
pub fn chunk_rows_for_sqlite<T>(items: &[T], params_per_row: usize) -> impl Iterator<Item = &[T]> {
    let rows_per_chunk = (SQLITE_MAX_PARAMS_CHUNK / params_per_row.max(1)).max(1);
    items.chunks(rows_per_chunk)
}

/// `2024-03-15` -> `20240315`
pub fn date_to_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// `20240315` -> `2024-03-15`
pub fn key_to_date(key: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(key / 10_000, (key / 100 % 100) as u32, (key % 100) as u32).ok_or_else(
        || ValidationError::InvalidInput(format!("Stored date key {} is not a valid date", key)).into(),
    )
}

pub fn timestamp_to_text(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

pub fn text_to_timestamp(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chunk_for_sqlite_over_limit() {
        let items: Vec<i32> = (0..1200).collect();
        let chunks: Vec<_> = chunk_for_sqlite(&items).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), SQLITE_MAX_PARAMS_CHUNK);
        assert_eq!(chunks[2].len(), 200);
    }

    #[test]
    fn test_chunk_rows_respects_params_per_row() {
        let items: Vec<i32> = (0..130).collect();
        let chunks: Vec<_> = chunk_rows_for_sqlite(&items, 8).collect();
        // 500 / 8 = 62 rows per statement
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![62, 62, 6]);
    }

    #[test]
    fn test_date_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date_to_key(date), 20240229);
        assert_eq!(key_to_date(20240229).unwrap(), date);
        assert!(key_to_date(20230229).is_err());
    }

    #[test]
    fn test_timestamp_text() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 22, 0, 0).unwrap();
        assert_eq!(text_to_timestamp(&timestamp_to_text(ts)).unwrap(), ts);
        assert!(text_to_timestamp("yesterday").is_err());
    }
}
