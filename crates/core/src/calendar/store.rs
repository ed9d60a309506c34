//! Trading calendar storage trait.

use async_trait::async_trait;

use super::model::{CalendarMonth, YearMonth};
use crate::errors::Result;

/// Persisted month-granularity trading calendar.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// The stored month, or `None` if it was never refreshed.
    fn get_month(&self, month: YearMonth) -> Result<Option<CalendarMonth>>;

    /// Replace every stored day of the month and its refresh stamp in one
    /// transaction.
    async fn replace_month(&self, month: &CalendarMonth) -> Result<()>;
}
