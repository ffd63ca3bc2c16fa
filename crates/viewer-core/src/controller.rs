// Viewport controller - turns scroll geometry into fetch and draw calls
//
// Owns the document's page index, its layout in the scroll container and the
// viewport state for one container. Each entry point computes a real page
// range, resolves the virtual pages of that range through the fetch pipeline
// and hands the sorted rasters to the compositor at the range's draw origin.
// Scroll offsets, draw origins and the content size all come from the same
// layout, so pages land where the scroll position expects them.

use crate::config::ViewerConfig;
use crate::index::PageIndex;
use crate::viewport::{scale_rate_for, target_real_pages, ContentLayout, ViewportState};
use crate::ViewerError;
use doc_model::{Document, VirtualPageNumber};
use pageview_cache::PageCache;
use pageview_render::{BoundingBox, Compositor, FrameLayout, Size, SurfaceFactory, SurfaceKey};
use pageview_scheduler::{FetchPipeline, PageImageProvider};
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, info, instrument};

/// Result of one fetch-and-draw pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawOutcome {
    /// Real pages covered, end exclusive
    pub pages: Range<usize>,

    /// Virtual pages drawn, ascending
    pub virtual_pages: Vec<VirtualPageNumber>,

    pub draw_origin_y: f64,
    pub scroll_offset_y: f64,
    pub scale_rate: f64,

    /// Drawn content in content coordinates
    pub bounding_box: BoundingBox,

    /// Whole scroll container content at `scale_rate`
    pub content_size: Size,

    /// Provider requests issued by the pipeline so far
    pub requests_issued: u64,
}

pub struct ViewportController<P, F: SurfaceFactory> {
    document: Document,
    index: PageIndex,
    layout: ContentLayout,
    state: ViewportState,
    config: ViewerConfig,
    viewport_index: u32,
    pipeline: FetchPipeline<P>,
    compositor: Compositor<F>,
}

impl<P: PageImageProvider, F: SurfaceFactory> ViewportController<P, F> {
    pub fn new(document: Document, provider: P, factory: F, config: ViewerConfig) -> Self {
        let pipeline = FetchPipeline::new(provider, PageCache::new()).with_config(config.fetch_config());
        Self::with_pipeline(document, pipeline, factory, config)
    }

    /// Controller drawing through an existing pipeline
    ///
    /// Viewports of the same document share one pipeline so their cache and
    /// in-flight requests are shared too.
    pub fn with_pipeline(
        document: Document,
        pipeline: FetchPipeline<P>,
        factory: F,
        config: ViewerConfig,
    ) -> Self {
        let index = PageIndex::new(&document);
        let mut state = ViewportState::default();
        state.scale_rate = scale_rate_for(&document, state.container_width, state.container_height);
        let layout = ContentLayout::new(&document, &index, &state, &config.freeform);

        Self {
            document,
            index,
            layout,
            state,
            compositor: Compositor::new(factory).with_thresholds(config.freeform),
            config,
            viewport_index: 0,
            pipeline,
        }
    }

    pub fn with_viewport_index(mut self, viewport_index: u32) -> Self {
        self.viewport_index = viewport_index;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn index(&self) -> &PageIndex {
        &self.index
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &FetchPipeline<P> {
        &self.pipeline
    }

    pub fn compositor(&self) -> &Compositor<F> {
        &self.compositor
    }

    pub fn surface_key(&self) -> SurfaceKey {
        SurfaceKey::new(self.document.id(), self.viewport_index)
    }

    pub fn surface(&self) -> Option<&F::Surface> {
        self.compositor.surface(self.surface_key())
    }

    /// Whole document size at the current scale rate
    pub fn content_size(&self) -> Size {
        self.layout.size()
    }

    /// Update the container size, recomputing the scale rate
    pub fn set_container_size(&mut self, width: f64, height: f64) {
        if (self.state.container_width, self.state.container_height) == (width, height) {
            return;
        }

        self.state.container_width = width;
        self.state.container_height = height;
        self.state.scale_rate = scale_rate_for(&self.document, width, height);
        self.refresh_layout();
        debug!(width, height, scale_rate = self.state.scale_rate, "container resized");
    }

    fn refresh_layout(&mut self) {
        self.layout = ContentLayout::new(&self.document, &self.index, &self.state, &self.config.freeform);
    }

    /// Fetch and draw the first `count` real pages
    ///
    /// Always covers at least one page; counts past the end are clamped.
    #[instrument(level = "debug", skip(self), fields(document = %self.document.id()))]
    pub async fn load_initial_pages(&mut self, count: usize) -> Result<DrawOutcome, ViewerError> {
        let end = count.clamp(1, self.index.real_page_count());
        let outcome = self.render_range(0..end).await?;

        self.state.loaded_page_count = self.state.loaded_page_count.max(end);
        Ok(outcome)
    }

    /// Fetch and draw whatever the container shows at `scroll_offset_y`, plus
    /// the look-ahead margin
    #[instrument(level = "debug", skip(self), fields(document = %self.document.id()))]
    pub async fn on_scroll_or_resize(
        &mut self,
        scroll_offset_y: f64,
        width: f64,
        height: f64,
    ) -> Result<DrawOutcome, ViewerError> {
        self.set_container_size(width, height);
        self.state.scroll_offset_y = scroll_offset_y;

        let range = target_real_pages(&self.layout, scroll_offset_y, height, self.config.look_ahead_pages);
        self.render_range(range).await
    }

    /// Scroll so that real page `index` starts at the top of the container
    ///
    /// Pages already cached are drawn without a provider round trip.
    #[instrument(level = "debug", skip(self), fields(document = %self.document.id()))]
    pub async fn jump_to_real_page(&mut self, index: usize) -> Result<DrawOutcome, ViewerError> {
        let index = index.min(self.index.real_page_count() - 1);
        let scroll_offset_y = self.layout.offset_before(index);
        self.state.scroll_offset_y = scroll_offset_y;

        let mut range = target_real_pages(
            &self.layout,
            scroll_offset_y,
            self.state.container_height,
            self.config.look_ahead_pages,
        );
        // The requested page always leads the range.
        range.start = index;
        range.end = range.end.max(index + 1);

        self.render_range(range).await
    }

    /// Replace the document, dropping every cached raster, pending request
    /// and surface
    pub fn reload(&mut self, document: Document) {
        info!(old = %self.document.id(), new = %document.id(), "reloading document");

        self.pipeline.cache().clear();
        self.pipeline.forget_inflight();
        self.compositor.forget_document(self.document.id());
        self.compositor.forget_document(document.id());

        self.index = PageIndex::new(&document);
        self.document = document;
        self.state.scroll_offset_y = 0.0;
        self.state.loaded_page_count = 0;
        self.state.scale_rate =
            scale_rate_for(&self.document, self.state.container_width, self.state.container_height);
        self.refresh_layout();
    }

    async fn render_range(&mut self, pages: Range<usize>) -> Result<DrawOutcome, ViewerError> {
        let document_id = self.document.id();
        let scale_rate = self.state.scale_rate;
        let numbers = self.index.virtual_pages_in_real_range(pages.clone());
        let draw_origin_y = self.layout.offset_before(pages.start);

        debug!(?pages, ?numbers, draw_origin_y, "resolving viewport pages");
        let rasters = self.pipeline.resolve(document_id, &numbers, scale_rate).await?;

        let frame = FrameLayout {
            viewport: Size::new(self.state.container_width, self.state.container_height),
            scale_rate,
            page_count: self.index.real_page_count(),
        };
        let bounding_box = self.compositor.draw(
            self.surface_key(),
            self.document.render_mode(),
            draw_origin_y,
            &rasters,
            &frame,
        )?;

        Ok(DrawOutcome {
            pages,
            virtual_pages: rasters.iter().map(|entry| entry.number).collect(),
            draw_origin_y,
            scroll_offset_y: self.state.scroll_offset_y,
            scale_rate,
            bounding_box,
            content_size: self.content_size(),
            requests_issued: self.pipeline.requests_issued(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{swatch, SyntheticProvider};
    use doc_model::{DocumentId, RenderMode};
    use futures::FutureExt;
    use pageview_render::{DrawingSurface, RasterSurface, RasterSurfaceFactory, Rect};
    use pageview_scheduler::{ChannelProvider, FetchError, ProviderError};

    const DOC: DocumentId = DocumentId(7);

    fn uniform(mode: RenderMode, count: usize, width: f64, height: f64) -> Document {
        (0..count)
            .fold(Document::builder(DOC, mode), |builder, _| builder.page(width, height))
            .build()
            .unwrap()
    }

    fn controller(document: Document) -> ViewportController<SyntheticProvider, RasterSurfaceFactory> {
        let provider = SyntheticProvider::new(document.clone());
        ViewportController::new(document, provider, RasterSurfaceFactory::default(), ViewerConfig::default())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
    }

    #[tokio::test]
    async fn initial_load_fetches_first_pages() {
        let mut controller = controller(uniform(RenderMode::Tiled, 5, 600.0, 400.0));
        controller.set_container_size(600.0, 800.0);

        let outcome = controller.load_initial_pages(2).await.unwrap();

        assert_eq!(outcome.pages, 0..2);
        assert_eq!(outcome.virtual_pages, vec![1, 2]);
        assert_eq!(outcome.requests_issued, 2);
        assert_eq!(outcome.bounding_box, Rect::new(0.0, 0.0, 600.0, 800.0));
        assert_eq!(outcome.content_size, Size::new(600.0, 2000.0));
        assert_eq!(controller.state().loaded_page_count, 2);

        let surface: &RasterSurface = controller.surface().unwrap();
        assert_eq!(surface.image().get_pixel(300, 100), &swatch(1));
        assert_eq!(surface.image().get_pixel(300, 500), &swatch(2));
    }

    #[tokio::test]
    async fn scrolling_prefetches_look_ahead_pages() {
        let mut controller = controller(uniform(RenderMode::Tiled, 10, 600.0, 400.0));

        let outcome = controller.on_scroll_or_resize(500.0, 600.0, 600.0).await.unwrap();

        assert_eq!(outcome.pages, 1..5);
        assert_eq!(outcome.virtual_pages, vec![2, 3, 4, 5]);
        assert_eq!(outcome.draw_origin_y, 400.0);
        assert_eq!(outcome.requests_issued, 4);

        assert_eq!(outcome.bounding_box, Rect::new(0.0, 400.0, 600.0, 1600.0));

        // The surface starts at the draw origin.
        let surface = controller.surface().unwrap();
        assert_eq!(surface.height(), 1600);
        assert_eq!(surface.image().get_pixel(10, 50), &swatch(2));
        assert_eq!(surface.image().get_pixel(10, 1550), &swatch(5));
    }

    #[tokio::test]
    async fn long_tiled_documents_only_allocate_the_window() {
        let mut controller = controller(uniform(RenderMode::Tiled, 40, 612.0, 792.0));

        let outcome = controller.load_initial_pages(1).await.unwrap();

        let scale_rate = 1280.0 / 612.0;
        assert_close(outcome.content_size.height, 40.0 * 792.0 * scale_rate);
        let surface = controller.surface().unwrap();
        assert_eq!(surface.width(), 1280);
        assert_eq!(surface.height(), (792.0 * scale_rate).round() as u32);

        let outcome = controller.jump_to_real_page(39).await.unwrap();
        assert_eq!(outcome.pages, 39..40);
        assert_close(outcome.draw_origin_y, 39.0 * 792.0 * scale_rate);
        assert_close(outcome.bounding_box.y, outcome.draw_origin_y);
    }

    #[tokio::test]
    async fn cached_pages_are_not_fetched_again() {
        let mut controller = controller(uniform(RenderMode::Tiled, 10, 600.0, 400.0));

        controller.on_scroll_or_resize(500.0, 600.0, 600.0).await.unwrap();
        let outcome = controller.on_scroll_or_resize(450.0, 600.0, 600.0).await.unwrap();
        assert_eq!(outcome.requests_issued, 4);

        // One new page enters the margin.
        let outcome = controller.on_scroll_or_resize(900.0, 600.0, 600.0).await.unwrap();
        assert_eq!(outcome.pages, 2..6);
        assert_eq!(outcome.requests_issued, 5);
    }

    #[tokio::test]
    async fn jump_reuses_cached_pages() {
        let mut controller = controller(uniform(RenderMode::Tiled, 10, 600.0, 400.0));
        controller.on_scroll_or_resize(500.0, 600.0, 600.0).await.unwrap();

        let outcome = controller.jump_to_real_page(1).await.unwrap();

        assert_eq!(outcome.pages, 1..5);
        assert_eq!(outcome.scroll_offset_y, 400.0);
        assert_eq!(outcome.draw_origin_y, 400.0);
        assert_eq!(outcome.requests_issued, 4);
    }

    #[tokio::test]
    async fn jump_past_the_end_clamps_to_last_page() {
        let mut controller = controller(uniform(RenderMode::Tiled, 3, 600.0, 400.0));
        controller.set_container_size(600.0, 600.0);

        let outcome = controller.jump_to_real_page(40).await.unwrap();

        assert_eq!(outcome.pages, 2..3);
        assert_eq!(outcome.virtual_pages, vec![3]);
        assert_eq!(outcome.scroll_offset_y, 800.0);
    }

    #[tokio::test]
    async fn resize_recomputes_scale_rate() {
        let mut controller = controller(uniform(RenderMode::Tiled, 4, 600.0, 400.0));

        let outcome = controller.on_scroll_or_resize(0.0, 1200.0, 800.0).await.unwrap();

        assert_eq!(outcome.scale_rate, 2.0);
        assert_eq!(controller.content_size(), Size::new(1200.0, 3200.0));
        // visible 0..400 native covers pages 0 and 1
        assert_eq!(outcome.pages, 0..4);

        let surface = controller.surface().unwrap();
        assert_eq!(surface.image().get_pixel(600, 900), &swatch(2));
    }

    #[tokio::test]
    async fn resize_refetches_rasters_at_the_new_scale() {
        let mut controller = controller(uniform(RenderMode::Tiled, 4, 600.0, 400.0));

        let outcome = controller.on_scroll_or_resize(0.0, 600.0, 600.0).await.unwrap();
        assert_eq!(outcome.requests_issued, 4);

        let outcome = controller.on_scroll_or_resize(0.0, 1200.0, 600.0).await.unwrap();

        assert_eq!(outcome.scale_rate, 2.0);
        assert_eq!(outcome.pages, 0..3);
        assert_eq!(outcome.requests_issued, 7);
        assert_eq!(controller.pipeline().cache().stats().replacements, 3);

        let surface = controller.surface().unwrap();
        assert_eq!(surface.height(), 2400);
        assert_eq!(surface.image().get_pixel(100, 1000), &swatch(2));
        assert_eq!(surface.image().get_pixel(100, 1700), &swatch(3));
    }

    #[tokio::test]
    async fn freeform_jump_lands_on_the_stacked_cell() {
        let mut controller = controller(uniform(RenderMode::Freeform, 10, 500.0, 300.0));
        controller.set_container_size(800.0, 600.0);

        let initial = controller.load_initial_pages(4).await.unwrap();
        assert_close(initial.bounding_box.bottom(), 1800.0 + 108.0 + 384.0);

        let outcome = controller.jump_to_real_page(3).await.unwrap();

        assert_eq!(outcome.pages, 3..7);
        assert_close(outcome.scroll_offset_y, 1800.0);
        assert_close(outcome.draw_origin_y, 1800.0);
        assert_close(outcome.bounding_box.y, 1908.0);
        assert_eq!(controller.content_size(), Size::new(800.0, 6000.0));

        let surface = controller.surface().unwrap();
        assert_eq!(surface.height(), 2400);
        assert_eq!(surface.image().get_pixel(400, 300), &swatch(4));
        assert_eq!(surface.image().get_pixel(400, 900), &swatch(5));
    }

    #[tokio::test]
    async fn freeform_scroll_matches_jump() {
        let mut controller = controller(uniform(RenderMode::Freeform, 10, 500.0, 300.0));

        let scrolled = controller.on_scroll_or_resize(1800.0, 800.0, 600.0).await.unwrap();
        let jumped = controller.jump_to_real_page(3).await.unwrap();

        assert_eq!(scrolled.pages, jumped.pages);
        assert_eq!(scrolled.draw_origin_y, jumped.draw_origin_y);
        assert_eq!(scrolled.bounding_box, jumped.bounding_box);
    }

    #[tokio::test]
    async fn slides_fit_the_container() {
        let mut controller = controller(uniform(RenderMode::SlideFit, 3, 960.0, 540.0));
        controller.set_container_size(800.0, 600.0);

        let outcome = controller.load_initial_pages(3).await.unwrap();
        let bounds = outcome.bounding_box;

        assert_close(bounds.x, 0.0);
        assert_close(bounds.y, 75.0);
        assert_close(bounds.width, 800.0);
        assert_close(bounds.height, 1350.0);
        assert_eq!(outcome.virtual_pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn provider_failure_keeps_fetched_pages() {
        let document = uniform(RenderMode::Tiled, 4, 600.0, 400.0);
        let provider = SyntheticProvider::new(uniform(RenderMode::Tiled, 2, 600.0, 400.0));
        let mut controller = ViewportController::new(
            document,
            provider,
            RasterSurfaceFactory::default(),
            ViewerConfig::default(),
        );

        let error = controller.load_initial_pages(4).await.unwrap_err();

        assert!(matches!(
            error,
            ViewerError::Fetch(FetchError::Provider { number: 3, source: ProviderError::UnknownPage(3), .. })
        ));
        assert!(controller.pipeline().cache().contains_all(&[1, 2]));
        assert_eq!(controller.state().loaded_page_count, 0);
    }

    #[tokio::test]
    async fn reload_drops_cache_and_surfaces() {
        let mut controller = controller(uniform(RenderMode::Tiled, 4, 600.0, 400.0));
        controller.load_initial_pages(2).await.unwrap();

        controller.reload(uniform(RenderMode::Tiled, 2, 300.0, 400.0));

        assert!(controller.pipeline().cache().is_empty());
        assert_eq!(controller.pipeline().pending_requests(), 0);
        assert_eq!(controller.compositor().surface_count(), 0);
        assert_eq!(controller.state().loaded_page_count, 0);
        assert_eq!(controller.index().real_page_count(), 2);
        assert_eq!(controller.state().scale_rate, controller.state().container_width / 300.0);
    }

    #[tokio::test]
    async fn reload_forgets_requests_still_in_flight() {
        let document = uniform(RenderMode::Tiled, 4, 600.0, 400.0);
        let (provider, _requests) = ChannelProvider::new(4);
        let mut controller = ViewportController::new(
            document.clone(),
            provider,
            RasterSurfaceFactory::default(),
            ViewerConfig::default(),
        );

        // Polled once: the request is sent, then the caller moves on.
        assert!(controller.load_initial_pages(1).now_or_never().is_none());
        assert_eq!(controller.pipeline().pending_requests(), 1);

        controller.reload(document);

        assert_eq!(controller.pipeline().pending_requests(), 0);
    }

    #[tokio::test]
    async fn viewports_sharing_a_pipeline_share_the_cache() {
        let document = uniform(RenderMode::Tiled, 4, 600.0, 400.0);
        let pipeline = FetchPipeline::new(SyntheticProvider::new(document.clone()), PageCache::new());

        let mut first = ViewportController::with_pipeline(
            document.clone(),
            pipeline.clone(),
            RasterSurfaceFactory::default(),
            ViewerConfig::default(),
        );
        let mut second = ViewportController::with_pipeline(
            document,
            pipeline,
            RasterSurfaceFactory::default(),
            ViewerConfig::default(),
        )
        .with_viewport_index(1);

        first.on_scroll_or_resize(0.0, 600.0, 400.0).await.unwrap();
        let outcome = second.on_scroll_or_resize(0.0, 600.0, 400.0).await.unwrap();

        assert_eq!(outcome.requests_issued, 4);
        assert_ne!(first.surface_key(), second.surface_key());
        assert!(second.surface().is_some());
    }
}
