//! Database models for the trading calendar.

use diesel::prelude::*;

/// One trading session, keyed by `YYYYMM` and day of month.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::trading_calendar)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradingDayDB {
    pub year_month: i32,
    pub day_of_month: i32,
}

/// Refresh stamp of a stored month.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::trading_calendar_months)]
#[diesel(primary_key(year_month))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradingCalendarMonthDB {
    pub year_month: i32,
    pub refreshed_at: String,
    pub day_count: i32,
}
