//! Page Cache Library
//!
//! In-memory raster cache for the virtual pages of an open document.

pub mod page;

pub use page::{CacheEntry, CacheStats, Lookup, PageCache, RasterRef};
