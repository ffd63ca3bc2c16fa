//! Single-flight fetch pipeline
//!
//! Resolves a list of virtual page numbers into cached rasters. Cached pages
//! are folded in up front; the rest are requested from the provider strictly
//! one at a time, in request order, and the result is always returned sorted
//! by page number.
//!
//! Rasters depend on the scale they were requested at, so a cached entry only
//! counts as a hit for the same scale. Anything else is fetched again and the
//! new raster overwrites the old one.
//!
//! Concurrent `resolve` calls on clones of the same pipeline never issue two
//! provider requests for the same page and scale: a request already in flight
//! is awaited through a shared future, and a page that landed in the cache
//! while a call was suspended is taken from the cache. The shared future
//! releases its in-flight slot itself when it settles, so a caller that gives
//! up mid-await does not leave the slot behind for the next one.

use crate::provider::{PageImageProvider, ProviderError};
use doc_model::{DocumentId, VirtualPageNumber};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use pageview_cache::{CacheEntry, Lookup, PageCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Tunables for provider requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Upper bound on a single provider request
    pub timeout: Duration,

    /// Consecutive unexpected responses tolerated for one request
    pub max_stray_responses: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), max_stray_responses: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("fetching page {number} of {document} timed out after {timeout:?}")]
    Timeout { document: DocumentId, number: VirtualPageNumber, timeout: Duration },
    #[error("fetching page {number} of {document} failed")]
    Provider {
        document: DocumentId,
        number: VirtualPageNumber,
        #[source]
        source: ProviderError,
    },
    #[error("provider answered page {requested} with page {received} too many times")]
    UnexpectedPage { requested: VirtualPageNumber, received: VirtualPageNumber },
}

type InflightKey = (DocumentId, VirtualPageNumber, u64);
type InflightFetch = Shared<BoxFuture<'static, Result<CacheEntry, FetchError>>>;
type InflightMap = HashMap<InflightKey, (u64, InflightFetch)>;

/// Fetch orchestrator shared by every viewport of a document session
pub struct FetchPipeline<P> {
    provider: Arc<P>,
    cache: PageCache,
    config: FetchConfig,
    inflight: Arc<Mutex<InflightMap>>,
    requests_issued: Arc<AtomicU64>,
}

impl<P> Clone for FetchPipeline<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            cache: self.cache.clone(),
            config: self.config,
            inflight: Arc::clone(&self.inflight),
            requests_issued: Arc::clone(&self.requests_issued),
        }
    }
}

impl<P: PageImageProvider> FetchPipeline<P> {
    pub fn new(provider: P, cache: PageCache) -> Self {
        Self {
            provider: Arc::new(provider),
            cache,
            config: FetchConfig::default(),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            requests_issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> FetchConfig {
        self.config
    }

    /// Number of requests actually sent to the provider so far
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued.load(Ordering::Relaxed)
    }

    /// Number of provider requests currently awaited
    pub fn pending_requests(&self) -> usize {
        self.inflight().len()
    }

    /// Stop sharing every pending request
    ///
    /// Used when the document is reloaded: later calls issue fresh requests
    /// instead of joining ones made for the previous load.
    pub fn forget_inflight(&self) {
        let mut inflight = self.inflight();
        if !inflight.is_empty() {
            debug!(dropped = inflight.len(), "forgetting in-flight page requests");
            inflight.clear();
        }
    }

    /// Resolve `numbers` into cache entries sorted by page number
    ///
    /// Returns without suspending when every page is cached. Otherwise the
    /// missing pages are requested one at a time; the first failure ends the
    /// call, leaving pages fetched so far in the cache.
    #[instrument(level = "debug", skip(self, numbers), fields(requested = numbers.len()))]
    pub async fn resolve(
        &self,
        document_id: DocumentId,
        numbers: &[VirtualPageNumber],
        scale: f64,
    ) -> Result<Vec<CacheEntry>, FetchError> {
        let Lookup { hits, misses } = self.cache.lookup_at_scale(numbers, scale);
        let mut accumulated = hits;
        let mut remaining = misses;
        let mut strays = 0;

        while let Some(&requested) = remaining.first() {
            let entry = match self.cache.get(requested).filter(|entry| entry.is_at_scale(scale)) {
                Some(entry) => entry,
                None => self.fetch_one(document_id, requested, scale).await?,
            };
            let received = entry.number;

            let Some(position) = remaining.iter().position(|&number| number == received) else {
                strays += 1;
                warn!(requested, received, strays, "provider answered with an unrequested page");

                if strays > self.config.max_stray_responses {
                    return Err(FetchError::UnexpectedPage { requested, received });
                }
                continue;
            };

            strays = 0;
            remaining.remove(position);

            match accumulated.iter_mut().find(|existing| existing.number == received) {
                Some(existing) => *existing = entry,
                None => accumulated.push(entry),
            }
        }

        accumulated.sort_by_key(|entry| entry.number);
        accumulated.dedup_by_key(|entry| entry.number);
        Ok(accumulated)
    }

    async fn fetch_one(
        &self,
        document_id: DocumentId,
        number: VirtualPageNumber,
        scale: f64,
    ) -> Result<CacheEntry, FetchError> {
        let key = (document_id, number, scale.to_bits());

        let future = {
            let mut inflight = self.inflight();
            match inflight.get(&key) {
                Some((_, existing)) => {
                    debug!(%document_id, number, "joining in-flight page request");
                    existing.clone()
                }
                None => {
                    let (id, future) = self.request(key);
                    inflight.insert(key, (id, future.clone()));
                    future
                }
            }
        };

        future.await
    }

    fn request(&self, key: InflightKey) -> (u64, InflightFetch) {
        let (document_id, number, scale) = (key.0, key.1, f64::from_bits(key.2));
        let provider = Arc::clone(&self.provider);
        let cache = self.cache.clone();
        let inflight = Arc::clone(&self.inflight);
        let timeout = self.config.timeout;

        let id = self.requests_issued.fetch_add(1, Ordering::Relaxed);
        debug!(%document_id, number, scale, "requesting page image");

        let fetch = async move {
            let image = tokio::time::timeout(timeout, provider.fetch_page(document_id, number, scale))
                .await
                .map_err(|_| FetchError::Timeout { document: document_id, number, timeout })?
                .map_err(|source| FetchError::Provider { document: document_id, number, source })?;

            // Cached before the in-flight slot is released so no caller can
            // observe the page as neither cached nor pending.
            let entry = image.into_entry().with_scale(scale);
            cache.upsert(entry.clone());
            Ok::<_, FetchError>(entry)
        };

        let future = async move {
            let result = fetch.await;

            // The slot may already belong to a newer request after a reload.
            let mut inflight = inflight.lock().unwrap_or_else(PoisonError::into_inner);
            if inflight.get(&key).is_some_and(|(current, _)| *current == id) {
                inflight.remove(&key);
            }

            result
        }
        .boxed()
        .shared();

        (id, future)
    }

    fn inflight(&self) -> MutexGuard<'_, InflightMap> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
