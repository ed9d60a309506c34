//! Pure fetch planning: decide from cache metadata whether a symbol needs an
//! upstream call, and for which window.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::prices::SymbolCacheMetadata;

/// What to do for one symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchDecision {
    /// The cache already covers the request.
    CacheHit,
    /// Call upstream for `[start, end]`.
    Fetch { start: NaiveDate, end: NaiveDate },
}

/// Inputs that stay fixed for a whole run.
#[derive(Clone, Copy, Debug)]
pub struct PlanContext {
    pub latest_trading_day: NaiveDate,
    pub now: DateTime<Utc>,
    pub freshness_window: Duration,
    pub incremental_overlap_days: i64,
}

/// Decide whether `[start, end]` must be fetched.
///
/// The request is clamped to the latest completed session. It is a hit when
/// the cached range covers it and either the metadata is fresh or the request
/// ends before the latest session (settled history does not go stale).
///
/// A miss whose cached range already covers `start` fetches incrementally,
/// from `cached_end - overlap` onward.
pub fn plan_symbol(
    metadata: Option<&SymbolCacheMetadata>,
    start: NaiveDate,
    end: NaiveDate,
    ctx: &PlanContext,
) -> FetchDecision {
    let target_end = end.min(ctx.latest_trading_day);
    if start > target_end {
        // Nothing can have closed in the window yet.
        return FetchDecision::CacheHit;
    }

    let Some(meta) = metadata else {
        return FetchDecision::Fetch {
            start,
            end: target_end,
        };
    };

    let covered = meta.covers(start, target_end);
    let settled = target_end < ctx.latest_trading_day;
    if covered && (settled || meta.is_fresh(ctx.now, ctx.freshness_window)) {
        return FetchDecision::CacheHit;
    }

    let fetch_start = if meta.cached_start <= start && start <= meta.cached_end {
        let overlap_start = meta.cached_end - Duration::days(ctx.incremental_overlap_days);
        overlap_start.max(start).min(target_end)
    } else {
        start
    };

    FetchDecision::Fetch {
        start: fetch_start,
        end: target_end,
    }
}
