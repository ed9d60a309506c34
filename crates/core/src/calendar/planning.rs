//! Pure calendar planning: month iteration, refresh windows and partition
//! state classification. Nothing here touches storage or the network.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};

use super::model::{CalendarMonth, PartitionState, YearMonth};

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The latest weekday on or before `date`.
pub fn previous_weekday(date: NaiveDate) -> NaiveDate {
    let mut current = date;
    while is_weekend(current) {
        match current.pred_opt() {
            Some(prev) => current = prev,
            None => break,
        }
    }
    current
}

/// Months touching `[start, end]`, ascending. Empty when `start > end`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<YearMonth> {
    if start > end {
        return Vec::new();
    }
    let last = YearMonth::from_date(end);
    let mut current = YearMonth::from_date(start);
    let mut months = Vec::new();
    while current <= last {
        months.push(current);
        current = current.succ();
    }
    months
}

/// Window to request from the reference index when refreshing `month`.
///
/// Clamped to `today`; `None` for months entirely in the future.
pub fn month_fetch_window(month: YearMonth, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = month.first_day()?;
    let last = month.last_day()?;
    if first > today {
        return None;
    }
    Some((first, last.min(today)))
}

/// The current month and the one before it keep receiving sessions.
pub fn is_recent_month(month: YearMonth, today: NaiveDate) -> bool {
    let current = YearMonth::from_date(today);
    month == current || month == current.pred()
}

/// Persisted state of a month given its stored data.
///
/// Recent months are always stale in the persisted sense; older ones go
/// stale `stale_after` past their last refresh.
pub fn classify_partition(
    stored: Option<&CalendarMonth>,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> PartitionState {
    let Some(month) = stored else {
        return PartitionState::Unknown;
    };
    if is_recent_month(month.month, now.date_naive()) {
        return PartitionState::Stale;
    }
    if now.signed_duration_since(month.refreshed_at) >= stale_after {
        PartitionState::Stale
    } else {
        PartitionState::Fresh
    }
}

/// Most recent date whose session could have closed by `now`.
pub fn last_session_candidate(now: DateTime<Utc>, session_close_hour_utc: u32) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() >= session_close_hour_utc {
        today
    } else {
        today.pred_opt().unwrap_or(today)
    }
}

/// Unverified shortcut: a range containing today or yesterday, when that
/// day is a weekday, is assumed to contain a session.
pub fn fast_path_trading_day(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> bool {
    let yesterday = today.pred_opt().unwrap_or(today);
    [today, yesterday]
        .into_iter()
        .any(|day| start <= day && day <= end && !is_weekend(day))
}

/// Weekdays within `[start, end]`.
pub fn weekdays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !is_weekend(*d))
        .collect()
}
