//! Default tuning values for the orchestrator and the calendar oracle.

/// Concurrent upstream fetches per batch.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Hours after which a symbol's metadata is no longer fresh.
pub const FRESHNESS_WINDOW_HOURS: i64 = 12;

/// Bounds of the random delay before each second-pass task, in milliseconds.
pub const SECOND_PASS_DELAY_MIN_MS: u64 = 2_000;
pub const SECOND_PASS_DELAY_MAX_MS: u64 = 5_000;

/// Days re-fetched before `cached_end` on incremental fetches, so late
/// upstream corrections overwrite the cached tail.
pub const INCREMENTAL_OVERLAP_DAYS: i64 = 5;

/// Days after which a refreshed calendar month goes stale.
pub const CALENDAR_STALE_AFTER_DAYS: i64 = 7;

/// In-process validity of a recent-month refresh, in seconds.
pub const RECENT_MONTH_TTL_SECS: u64 = 15 * 60;

/// Waits on an in-flight month refresh before refreshing independently.
pub const COALESCE_POLLS: u32 = 30;
pub const COALESCE_POLL_INTERVAL_MS: u64 = 200;

/// UTC hour after which today's session counts as completed.
pub const SESSION_CLOSE_HOUR_UTC: u32 = 21;

/// Months searched backwards for the latest completed session.
pub const LATEST_SESSION_LOOKBACK_MONTHS: usize = 3;
