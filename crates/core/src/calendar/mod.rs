//! Trading calendar.
//!
//! - [`model`] - `YearMonth`, `CalendarMonth`, `TradingDay`, `PartitionState`
//! - [`planning`] - Pure month and window helpers
//! - [`store`] - The `CalendarStore` persistence trait
//! - [`oracle`] - `TradingCalendarOracle`, the shared trading-day oracle

pub mod model;
pub mod oracle;
pub mod planning;
pub mod store;

pub use model::{CalendarMonth, PartitionState, TradingDay, YearMonth};
pub use oracle::{CalendarConfig, TradingCalendarOracle};
pub use store::CalendarStore;
