//! SQLite store for cached prices, no-data intervals and cache metadata.

mod model;
mod partitions;
mod repository;

pub use model::{NoDataIntervalDB, PriceRowDB, SymbolCacheMetadataDB, ALL_SYMBOLS_ID};
pub use partitions::{partition_table, PartitionRegistry};
pub use repository::SqlitePriceStore;
