//! Page Fetch Scheduler Library
//!
//! Single-flight fetch pipeline in front of an asynchronous page image
//! provider.
//!
//! Pages already in the [`PageCache`](pageview_cache::PageCache) are answered
//! immediately; missing pages are requested from the provider one at a time
//! and cached as they arrive.
//!
//! # Example
//!
//! ```
//! use doc_model::DocumentId;
//! use pageview_cache::PageCache;
//! use pageview_scheduler::{ChannelProvider, FetchPipeline, PageImage};
//! use image::RgbaImage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (provider, mut requests) = ChannelProvider::new(8);
//!
//! // The engine side answers requests as they arrive.
//! tokio::spawn(async move {
//!     while let Some(request) = requests.recv().await {
//!         let number = request.number;
//!         request.respond(Ok(PageImage::new(number, RgbaImage::new(16, 16))));
//!     }
//! });
//!
//! let pipeline = FetchPipeline::new(provider, PageCache::new());
//! let pages = pipeline.resolve(DocumentId(1), &[3, 1, 2], 1.0).await.unwrap();
//! assert_eq!(pages.iter().map(|page| page.number).collect::<Vec<_>>(), vec![1, 2, 3]);
//! # }
//! ```

mod pipeline;
mod provider;

pub use pipeline::{FetchConfig, FetchError, FetchPipeline};
pub use provider::{ChannelProvider, PageImage, PageImageProvider, ProviderError, ProviderRequest};
