//! Trading calendar models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month, ordered chronologically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Returns `None` for a month outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Persisted `YYYYMM` form.
    pub fn key(&self) -> i32 {
        self.year * 100 + self.month as i32
    }

    pub fn from_key(key: i32) -> Option<Self> {
        Self::new(key.div_euclid(100), key.rem_euclid(100) as u32)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.succ().first_day().and_then(|d| d.pred_opt())
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Refresh state of one month of the calendar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionState {
    /// Never refreshed.
    Unknown,
    /// A refresh is in flight.
    Fetching,
    Fresh,
    /// Needs a refresh before it can answer.
    Stale,
}

/// The trading days of one month, as confirmed by the reference index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub month: YearMonth,
    /// Days of month with a reference session.
    pub trading_days: BTreeSet<u32>,
    pub refreshed_at: DateTime<Utc>,
}

impl CalendarMonth {
    pub fn new(month: YearMonth, trading_days: BTreeSet<u32>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            month,
            trading_days,
            refreshed_at,
        }
    }

    /// Build from session dates, ignoring dates in other months.
    pub fn from_sessions(
        month: YearMonth,
        sessions: impl IntoIterator<Item = NaiveDate>,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        let trading_days = sessions
            .into_iter()
            .filter(|d| YearMonth::from_date(*d) == month)
            .map(|d| d.day())
            .collect();
        Self::new(month, trading_days, refreshed_at)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        YearMonth::from_date(date) == self.month && self.trading_days.contains(&date.day())
    }

    /// Latest trading day on or before `date` within this month.
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let limit = if YearMonth::from_date(date) == self.month {
            date.day()
        } else if YearMonth::from_date(date) > self.month {
            31
        } else {
            return None;
        };
        self.trading_days
            .range(..=limit)
            .next_back()
            .and_then(|day| self.month.date(*day))
    }

    /// Trading days within `[start, end]`.
    pub fn days_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.trading_days
            .iter()
            .filter_map(|day| self.month.date(*day))
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }

    /// All sessions of the month, ascending.
    pub fn sessions(&self) -> Vec<TradingDay> {
        self.trading_days
            .iter()
            .filter_map(|day| self.month.date(*day))
            .map(TradingDay)
            .collect()
    }
}

/// A confirmed trading session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradingDay(pub NaiveDate);

impl TradingDay {
    pub fn month(&self) -> YearMonth {
        YearMonth::from_date(self.0)
    }
}
