//! Cached prices, confirmed-absence intervals and cache metadata.
//!
//! - [`model`] - `PricePoint`, `NoDataInterval`, `SymbolCacheMetadata` and the
//!   pure no-data merge
//! - [`store`] - The `PriceCacheStore` trait implemented by the storage layer

pub mod model;
pub mod store;

pub use model::{
    merge_no_data, NoDataInterval, NoDataKey, NoDataMerge, PricePoint, SymbolCacheMetadata,
    ALL_SYMBOLS_KEY,
};
pub use store::PriceCacheStore;
