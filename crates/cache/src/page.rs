//! In-memory virtual page cache
//!
//! Holds the rasters fetched for the virtual pages of the open document.
//! Entries are keyed by virtual page number and overwritten in place when a
//! page is fetched again. Every entry remembers the scale it was rasterized
//! at, so a lookup at a different scale treats it as a miss. Nothing is evicted automatically: the cache lives as
//! long as the document session and is cleared wholesale on reload.

use doc_model::VirtualPageNumber;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Shared handle to decoded RGBA pixels.
pub type RasterRef = Arc<RgbaImage>;

/// Raster fetched for one virtual page
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Virtual page number this raster belongs to
    pub number: VirtualPageNumber,

    /// Decoded pixels
    pub raster: RasterRef,

    /// Width of the raster in pixels
    pub width: u32,

    /// Height of the raster in pixels
    pub height: u32,

    /// Scale rate the raster was requested at
    pub scale: f64,
}

impl CacheEntry {
    /// Create an entry whose size is taken from the raster itself
    pub fn new(number: VirtualPageNumber, raster: RgbaImage) -> Self {
        let (width, height) = raster.dimensions();
        Self { number, raster: Arc::new(raster), width, height, scale: 1.0 }
    }

    /// Create an entry from an already shared raster and reported size
    pub fn from_parts(number: VirtualPageNumber, raster: RasterRef, width: u32, height: u32) -> Self {
        Self { number, raster, width, height, scale: 1.0 }
    }

    /// Set the scale rate the raster was requested at
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Whether this raster was produced for `scale`
    pub fn is_at_scale(&self, scale: f64) -> bool {
        self.scale.to_bits() == scale.to_bits()
    }

    /// Get the memory size of this raster in bytes
    pub fn memory_size(&self) -> usize {
        self.raster.as_raw().len()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub entry_count: usize,

    /// Total bytes held by cached rasters
    pub memory_used: usize,

    /// Number of page lookups answered from the cache
    pub hits: u64,

    /// Number of page lookups that required a fetch
    pub misses: u64,

    /// Number of upserts, including replacements
    pub upserts: u64,

    /// Number of upserts that replaced an existing entry
    pub replacements: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Result of partitioning a page request against the cache
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    /// Entries already cached, in request order
    pub hits: Vec<CacheEntry>,

    /// Page numbers not cached, in request order
    pub misses: Vec<VirtualPageNumber>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<VirtualPageNumber, CacheEntry>,
    memory_used: usize,
    stats: CacheStats,
}

impl CacheState {
    fn refresh_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Unbounded page cache scoped to one document session
///
/// Cloning the cache yields another handle to the same entries, so the fetch
/// pipeline and the viewport controller observe the same map.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use pageview_cache::{CacheEntry, PageCache};
///
/// let cache = PageCache::new();
/// cache.upsert(CacheEntry::new(1, RgbaImage::new(4, 4)));
///
/// let lookup = cache.lookup(&[1, 2]);
/// assert_eq!(lookup.hits.len(), 1);
/// assert_eq!(lookup.misses, vec![2]);
/// ```
#[derive(Clone, Default)]
pub struct PageCache {
    state: Arc<Mutex<CacheState>>,
}

impl PageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Partition requested page numbers into cached entries and misses
    ///
    /// Both lists keep the order of `numbers`. No I/O happens here, so a fully
    /// cached request can be answered without suspending.
    pub fn lookup(&self, numbers: &[VirtualPageNumber]) -> Lookup {
        self.partition(numbers, None)
    }

    /// Like [`lookup`](Self::lookup), but entries rasterized at another scale
    /// count as misses
    pub fn lookup_at_scale(&self, numbers: &[VirtualPageNumber], scale: f64) -> Lookup {
        self.partition(numbers, Some(scale))
    }

    fn partition(&self, numbers: &[VirtualPageNumber], scale: Option<f64>) -> Lookup {
        let mut state = self.state();
        let mut lookup = Lookup::default();

        for &number in numbers {
            let cached = state
                .entries
                .get(&number)
                .filter(|entry| scale.map_or(true, |scale| entry.is_at_scale(scale)));
            match cached {
                Some(entry) => lookup.hits.push(entry.clone()),
                None => lookup.misses.push(number),
            }
        }

        state.stats.hits += lookup.hits.len() as u64;
        state.stats.misses += lookup.misses.len() as u64;

        trace!(hits = lookup.hits.len(), misses = lookup.misses.len(), "page cache lookup");
        lookup
    }

    /// Insert an entry, replacing any existing entry for the same page
    pub fn upsert(&self, entry: CacheEntry) {
        let mut state = self.state();
        let size = entry.memory_size();
        let number = entry.number;

        if let Some(previous) = state.entries.insert(number, entry) {
            state.memory_used = state.memory_used.saturating_sub(previous.memory_size());
            state.stats.replacements += 1;
        }

        state.memory_used += size;
        state.stats.upserts += 1;
        state.refresh_stats();
    }

    /// Retrieve a cached entry without touching hit statistics
    pub fn get(&self, number: VirtualPageNumber) -> Option<CacheEntry> {
        self.state().entries.get(&number).cloned()
    }

    /// Check whether a page is cached
    pub fn contains(&self, number: VirtualPageNumber) -> bool {
        self.state().entries.contains_key(&number)
    }

    /// Check whether every page in `numbers` is cached
    pub fn contains_all(&self, numbers: &[VirtualPageNumber]) -> bool {
        let state = self.state();
        numbers.iter().all(|number| state.entries.contains_key(number))
    }

    /// Discard every entry
    ///
    /// Called when a document is (re)loaded. This is the only way entries
    /// leave the cache.
    pub fn clear(&self) {
        let mut state = self.state();
        let dropped = state.entries.len();
        state.entries.clear();
        state.memory_used = 0;
        state.refresh_stats();

        trace!(dropped, "page cache cleared");
    }

    /// Number of cached pages
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the cache holds no pages
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        self.state().stats
    }
}
