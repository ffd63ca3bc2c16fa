//! Provider that paints solid swatches instead of converting a document.
//!
//! Used by the CLI and by tests to drive the controller end to end. Each
//! virtual page gets a colour derived from its number so stacked pages stay
//! distinguishable in the output image.

use doc_model::{Document, DocumentId, RenderMode, VirtualPageNumber};
use image::{Rgba, RgbaImage};
use pageview_scheduler::{PageImage, PageImageProvider, ProviderError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const PALETTE: [[u8; 3]; 6] = [
    [0xe0, 0x6c, 0x75],
    [0x98, 0xc3, 0x79],
    [0x61, 0xaf, 0xef],
    [0xe5, 0xc0, 0x7b],
    [0xc6, 0x78, 0xdd],
    [0x56, 0xb6, 0xc2],
];

/// Colour used for virtual page `number`
pub fn swatch(number: VirtualPageNumber) -> Rgba<u8> {
    let [r, g, b] = PALETTE[number as usize % PALETTE.len()];
    Rgba([r, g, b, 255])
}

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    document: Arc<Document>,
    latency: Option<Duration>,
}

impl SyntheticProvider {
    pub fn new(document: Document) -> Self {
        Self { document: Arc::new(document), latency: None }
    }

    /// Delay every answer, to exercise look-ahead and timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn paint(
        &self,
        document_id: DocumentId,
        number: VirtualPageNumber,
        scale: f64,
    ) -> Result<PageImage, ProviderError> {
        if document_id != self.document.id() {
            return Err(ProviderError::Failed(format!("unknown document {document_id}")));
        }

        let location = self.document.locate(number).ok_or(ProviderError::UnknownPage(number))?;

        // Tiled slices arrive pre-scaled; every other mode is drawn from
        // native-size rasters.
        let rate = match self.document.render_mode() {
            RenderMode::Tiled if scale.is_finite() && scale > 0.0 => scale,
            _ => 1.0,
        };
        let width = (location.width * rate).round().max(1.0) as u32;
        let height = (location.height * rate).round().max(1.0) as u32;

        trace!(number, width, height, "painting synthetic page");
        Ok(PageImage::new(number, RgbaImage::from_pixel(width, height, swatch(number))))
    }
}

impl PageImageProvider for SyntheticProvider {
    fn fetch_page(
        &self,
        document_id: DocumentId,
        number: VirtualPageNumber,
        scale: f64,
    ) -> impl Future<Output = Result<PageImage, ProviderError>> + Send {
        async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            self.paint(document_id, number, scale)
        }
    }
}
