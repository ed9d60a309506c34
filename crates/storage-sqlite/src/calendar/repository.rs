use async_trait::async_trait;
use diesel::prelude::*;
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::model::{TradingCalendarMonthDB, TradingDayDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::trading_calendar::dsl as tc_dsl;
use crate::schema::trading_calendar_months::dsl as tcm_dsl;
use crate::utils::{chunk_for_sqlite, text_to_timestamp, timestamp_to_text};
use pricecache_core::calendar::{CalendarMonth, CalendarStore, YearMonth};
use pricecache_core::errors::{Error, Result, ValidationError};
use pricecache_core::RetryPolicy;

/// SQLite-backed [`CalendarStore`]. Shares the writer actor with the price store.
pub struct SqliteCalendarStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    busy_retry: RetryPolicy<Error>,
}

impl SqliteCalendarStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self {
            pool,
            writer,
            busy_retry: RetryPolicy::storage_busy(),
        }
    }

    pub fn with_busy_retry(mut self, policy: RetryPolicy<Error>) -> Self {
        self.busy_retry = policy;
        self
    }
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    fn get_month(&self, month: YearMonth) -> Result<Option<CalendarMonth>> {
        let mut conn = get_connection(&self.pool)?;
        let key = month.key();

        let Some(stamp) = tcm_dsl::trading_calendar_months
            .find(key)
            .select(TradingCalendarMonthDB::as_select())
            .first::<TradingCalendarMonthDB>(&mut conn)
            .optional()
            .into_core()?
        else {
            return Ok(None);
        };

        let days: BTreeSet<u32> = tc_dsl::trading_calendar
            .filter(tc_dsl::year_month.eq(key))
            .select(tc_dsl::day_of_month)
            .load::<i32>(&mut conn)
            .into_core()?
            .into_iter()
            .filter_map(|day| u32::try_from(day).ok())
            .collect();

        Ok(Some(CalendarMonth::new(
            month,
            days,
            text_to_timestamp(&stamp.refreshed_at)?,
        )))
    }

    async fn replace_month(&self, month: &CalendarMonth) -> Result<()> {
        let key = month.month.key();
        let rows: Vec<TradingDayDB> = month
            .trading_days
            .iter()
            .map(|day| TradingDayDB {
                year_month: key,
                day_of_month: *day as i32,
            })
            .collect();
        let stamp = TradingCalendarMonthDB {
            year_month: key,
            refreshed_at: timestamp_to_text(month.refreshed_at),
            day_count: i32::try_from(rows.len()).map_err(|_| {
                ValidationError::InvalidInput(format!("Too many sessions in {}", month.month))
            })?,
        };

        self.writer
            .exec_with_retry(
                &self.busy_retry,
                &format!("replace calendar {}", month.month),
                move |conn| {
                    diesel::delete(tc_dsl::trading_calendar.filter(tc_dsl::year_month.eq(key)))
                        .execute(conn)
                        .into_core()?;
                    for chunk in chunk_for_sqlite(&rows) {
                        diesel::insert_into(tc_dsl::trading_calendar)
                            .values(chunk)
                            .execute(conn)
                            .into_core()?;
                    }
                    diesel::replace_into(tcm_dsl::trading_calendar_months)
                        .values(&stamp)
                        .execute(conn)
                        .into_core()?;
                    Ok(())
                },
            )
            .await?;

        debug!(
            "Stored {} sessions for {}",
            month.trading_days.len(),
            month.month
        );
        Ok(())
    }
}
