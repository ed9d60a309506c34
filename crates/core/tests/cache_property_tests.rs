//! Property-based tests for no-data interval merging and fetch planning.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use pricecache_core::fetch::{plan_symbol, FetchDecision, PlanContext};
use pricecache_core::prices::{merge_no_data, NoDataInterval, NoDataKey, SymbolCacheMetadata};
use proptest::prelude::*;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    base() + Duration::days(offset)
}

/// Inclusive `(start, end)` offsets from 2024-01-01 with `start <= end`.
fn arb_range() -> impl Strategy<Value = (i64, i64)> {
    (0i64..120, 0i64..15).prop_map(|(start, len)| (start, start + len))
}

/// Apply `merge_no_data` the way the store does: drop absorbed, keep merged.
fn record(stored: &mut Vec<NoDataInterval>, key: &NoDataKey, start: i64, end: i64) {
    let merge = merge_no_data(stored, key.clone(), day(start), day(end)).unwrap();
    if merge.is_noop() {
        return;
    }
    stored.retain(|i| !merge.absorbed.contains(i));
    stored.push(merge.merged);
}

fn covered_days(intervals: &[NoDataInterval]) -> BTreeSet<NaiveDate> {
    intervals
        .iter()
        .flat_map(|i| i.start.iter_days().take_while(move |d| *d <= i.end))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Stored intervals never overlap or touch, whatever the insertion order.
    #[test]
    fn prop_merged_intervals_are_disjoint(ranges in proptest::collection::vec(arb_range(), 1..20)) {
        let key = NoDataKey::symbol("AAPL");
        let mut stored = Vec::new();
        for (start, end) in &ranges {
            record(&mut stored, &key, *start, *end);
        }

        stored.sort_by_key(|i| i.start);
        for pair in stored.windows(2) {
            prop_assert!(
                pair[0].end + Duration::days(1) < pair[1].start,
                "{:?} and {:?} should have been merged",
                pair[0],
                pair[1]
            );
        }
    }

    /// Merging neither loses nor invents covered days.
    #[test]
    fn prop_merge_preserves_union(ranges in proptest::collection::vec(arb_range(), 1..20)) {
        let key = NoDataKey::symbol("AAPL");
        let mut stored = Vec::new();
        let mut expected = BTreeSet::new();
        for (start, end) in &ranges {
            record(&mut stored, &key, *start, *end);
            expected.extend((*start..=*end).map(day));
        }

        prop_assert_eq!(covered_days(&stored), expected);
    }

    /// Intervals of other keys are never absorbed.
    #[test]
    fn prop_merge_respects_keys(
        aapl in proptest::collection::vec(arb_range(), 1..10),
        msft in proptest::collection::vec(arb_range(), 1..10),
    ) {
        let mut stored = Vec::new();
        for (start, end) in &aapl {
            record(&mut stored, &NoDataKey::symbol("AAPL"), *start, *end);
        }
        let aapl_intervals = stored.clone();
        for (start, end) in &msft {
            record(&mut stored, &NoDataKey::symbol("MSFT"), *start, *end);
        }

        let kept: Vec<_> = stored
            .iter()
            .filter(|i| i.key == NoDataKey::symbol("AAPL"))
            .cloned()
            .collect();
        prop_assert_eq!(kept, aapl_intervals);
    }

    /// A planned fetch stays inside the request and never reaches past the
    /// latest completed session.
    #[test]
    fn prop_planned_window_within_request(
        (start, end) in (0i64..200, 0i64..200).prop_map(|(a, b)| (a.min(b), a.max(b))),
        latest in 0i64..200,
        cached in proptest::option::of(arb_range()),
        age_hours in 0i64..96,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 8, 1, 22, 0, 0).unwrap();
        let metadata = cached.map(|(cached_start, cached_end)| {
            SymbolCacheMetadata::new(
                "AAPL",
                now - Duration::hours(age_hours),
                day(cached_start),
                day(cached_end),
                day(cached_end),
            )
        });
        let ctx = PlanContext {
            latest_trading_day: day(latest),
            now,
            freshness_window: Duration::hours(24),
            incremental_overlap_days: 5,
        };

        match plan_symbol(metadata.as_ref(), day(start), day(end), &ctx) {
            FetchDecision::CacheHit => {}
            FetchDecision::Fetch { start: fetch_start, end: fetch_end } => {
                prop_assert!(day(start) <= fetch_start);
                prop_assert!(fetch_start <= fetch_end);
                prop_assert!(fetch_end <= day(end).min(day(latest)));
            }
        }
    }
}
