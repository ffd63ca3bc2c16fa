//! Page image provider seam
//!
//! The provider stands in for the document conversion engine: given a document
//! and a virtual page number it produces a decoded raster for that slice. The
//! pipeline only ever talks to it through [`PageImageProvider`], so tests and
//! hosts can plug in anything that can answer with a future.

use doc_model::{DocumentId, VirtualPageNumber};
use image::RgbaImage;
use pageview_cache::CacheEntry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Raster returned by a provider for one virtual page
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Page the provider says this raster belongs to
    pub number: VirtualPageNumber,

    /// Reported raster width in pixels
    pub width: u32,

    /// Reported raster height in pixels
    pub height: u32,

    /// Decoded pixels
    pub raster: RgbaImage,
}

impl PageImage {
    /// Wrap a raster, taking the reported size from its dimensions
    pub fn new(number: VirtualPageNumber, raster: RgbaImage) -> Self {
        let (width, height) = raster.dimensions();
        Self { number, width, height, raster }
    }

    /// Cache entry for this raster. The caller records the request scale.
    pub fn into_entry(self) -> CacheEntry {
        CacheEntry::from_parts(self.number, Arc::new(self.raster), self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("page {0} is not part of the document")]
    UnknownPage(VirtualPageNumber),
    #[error("provider is no longer running")]
    Disconnected,
    #[error("provider failed: {0}")]
    Failed(String),
}

/// Asynchronous source of page rasters
///
/// Implementations must be cheap to share: the pipeline holds the provider in
/// an `Arc` and may call it from several `resolve` calls at once.
pub trait PageImageProvider: Send + Sync + 'static {
    fn fetch_page(
        &self,
        document_id: DocumentId,
        number: VirtualPageNumber,
        scale: f64,
    ) -> impl Future<Output = Result<PageImage, ProviderError>> + Send;
}

/// One page request travelling to a channel-backed provider
#[derive(Debug)]
pub struct ProviderRequest {
    pub document_id: DocumentId,
    pub number: VirtualPageNumber,
    pub scale: f64,
    reply: oneshot::Sender<Result<PageImage, ProviderError>>,
}

impl ProviderRequest {
    /// Complete the request. A dropped requester is not an error.
    pub fn respond(self, result: Result<PageImage, ProviderError>) {
        let _ = self.reply.send(result);
    }
}

/// Provider that forwards requests over a channel
///
/// Each call sends a [`ProviderRequest`] and waits on its private reply
/// channel, so responses are correlated with the request that asked for them.
/// The receiving half is typically drained by a thread that owns the native
/// conversion engine.
#[derive(Debug, Clone)]
pub struct ChannelProvider {
    requests: mpsc::Sender<ProviderRequest>,
}

impl ChannelProvider {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProviderRequest>) {
        let (requests, receiver) = mpsc::channel(capacity.max(1));
        (Self { requests }, receiver)
    }
}

impl PageImageProvider for ChannelProvider {
    fn fetch_page(
        &self,
        document_id: DocumentId,
        number: VirtualPageNumber,
        scale: f64,
    ) -> impl Future<Output = Result<PageImage, ProviderError>> + Send {
        let requests = self.requests.clone();

        async move {
            let (reply, response) = oneshot::channel();
            requests
                .send(ProviderRequest { document_id, number, scale, reply })
                .await
                .map_err(|_| ProviderError::Disconnected)?;

            response.await.map_err(|_| ProviderError::Disconnected)?
        }
    }
}
