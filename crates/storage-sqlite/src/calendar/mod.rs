//! SQLite storage for the month-granularity trading calendar.

mod model;
mod repository;

pub use model::{TradingCalendarMonthDB, TradingDayDB};
pub use repository::SqliteCalendarStore;

// Re-export trait from core for convenience
pub use pricecache_core::calendar::CalendarStore;
