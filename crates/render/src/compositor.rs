// Page compositor - places fetched page rasters onto a drawing surface
//
// Takes the sorted rasters for a viewport, the document's render mode and the
// draw origin computed by the viewport controller, sizes the surface for the
// mode and paints every raster at its destination rectangle. A surface only
// holds the fetched window: its top edge sits at the draw origin in content
// coordinates, so long documents never need a document-sized backing store.
// The returned bounding box is where the host should position the drawn
// content inside the scroll container.

use crate::freeform::{self, fit_rate, FreeformThresholds};
use crate::surface::{BoundingBox, DrawingSurface, Rect, RenderError, Size, SurfaceFactory, SurfaceKey};
use doc_model::{DocumentId, RenderMode};
use pageview_cache::CacheEntry;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Geometry of the frame being drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    /// Visible container size
    pub viewport: Size,

    /// Content-to-viewport scale of the document
    pub scale_rate: f64,

    /// Number of real pages in the document
    pub page_count: usize,
}

/// Page compositor - owns one surface per document viewport
pub struct Compositor<F: SurfaceFactory> {
    /// Creates surfaces the first time a key is drawn
    factory: F,

    /// Surfaces reused across incremental draws
    surfaces: HashMap<SurfaceKey, F::Surface>,

    /// Bounding boxes of single images already laid out
    single_images: HashMap<SurfaceKey, BoundingBox>,

    /// Freeform decision table thresholds
    thresholds: FreeformThresholds,
}

impl<F: SurfaceFactory> Compositor<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            surfaces: HashMap::new(),
            single_images: HashMap::new(),
            thresholds: FreeformThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: FreeformThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn surface(&self, key: SurfaceKey) -> Option<&F::Surface> {
        self.surfaces.get(&key)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Drop every surface and layout memo of a document (on reload)
    pub fn forget_document(&mut self, document_id: DocumentId) {
        self.surfaces.retain(|key, _| key.document_id != document_id);
        self.single_images.retain(|key, _| key.document_id != document_id);
    }

    /// Draw `rasters` for the viewport identified by `key`
    ///
    /// Rasters must be sorted by virtual page number. The surface is resized
    /// to the window they cover and painted from its top edge, which the host
    /// places at `draw_origin_y`. Returns the bounding box of the drawn
    /// content in content coordinates.
    pub fn draw(
        &mut self,
        key: SurfaceKey,
        render_mode: RenderMode,
        draw_origin_y: f64,
        rasters: &[CacheEntry],
        frame: &FrameLayout,
    ) -> Result<BoundingBox, RenderError> {
        let viewport = frame.viewport;
        if !(viewport.width.is_finite() && viewport.height.is_finite())
            || viewport.width <= 0.0
            || viewport.height <= 0.0
        {
            return Err(RenderError::InvalidViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }

        let rasters: Vec<&CacheEntry> = rasters
            .iter()
            .filter(|entry| {
                let drawable = entry.width > 0 && entry.height > 0;
                if !drawable {
                    warn!(number = entry.number, "skipping empty raster");
                }
                drawable
            })
            .collect();

        if rasters.is_empty() {
            trace!(?key, "nothing to draw");
            return Ok(Rect::new(0.0, 0.0, viewport.width, viewport.height));
        }

        debug!(?key, ?render_mode, draw_origin_y, count = rasters.len(), "compositing rasters");

        match render_mode {
            RenderMode::SlideFit => self.draw_slides(key, &rasters, frame),
            RenderMode::Tiled => self.draw_tiles(key, draw_origin_y, &rasters, frame),
            RenderMode::SingleImage => self.draw_single_image(key, draw_origin_y, rasters[0], frame),
            RenderMode::Freeform => self.draw_freeform(key, draw_origin_y, &rasters, frame),
        }
    }

    /// Each slide is fitted to the viewport and stacked without gaps
    fn draw_slides(
        &mut self,
        key: SurfaceKey,
        rasters: &[&CacheEntry],
        frame: &FrameLayout,
    ) -> Result<BoundingBox, RenderError> {
        let viewport = frame.viewport;
        let first = rasters[0];
        let rate = fit_rate(first.width as f64, first.height as f64, viewport.width, viewport.height);
        let slide_width = first.width as f64 * rate;
        let slide_height = first.height as f64 * rate;
        let slide_count = frame.page_count.max(rasters.len()) as f64;

        let window = rasters.iter().map(|entry| entry.height as f64 * rate).sum::<f64>();
        let (width, height) = Size::new(slide_width, window).to_pixels();
        let surface = self.prepare_surface(key, width, height)?;

        let mut y = 0.0;
        for entry in rasters {
            let dst_height = entry.height as f64 * rate;
            let dst = Rect::new(0.0, y, entry.width as f64 * rate, dst_height);
            surface.draw_image(&entry.raster, Rect::of_size(entry.width, entry.height), dst);
            y += dst_height;
        }

        Ok(Rect::new(
            ((viewport.width - slide_width) / 2.0).max(0.0),
            ((viewport.height - slide_height) / 2.0).max(0.0),
            slide_width,
            slide_height * slide_count,
        ))
    }

    /// Pre-scaled rasters stacked at native size below the draw origin
    fn draw_tiles(
        &mut self,
        key: SurfaceKey,
        draw_origin_y: f64,
        rasters: &[&CacheEntry],
        frame: &FrameLayout,
    ) -> Result<BoundingBox, RenderError> {
        let viewport = frame.viewport;
        let widest = rasters.iter().map(|entry| entry.width as f64).fold(viewport.width, f64::max);
        let window = rasters.iter().map(|entry| entry.height as f64).sum::<f64>();

        let (width, height) = Size::new(widest, window).to_pixels();
        let surface = self.prepare_surface(key, width, height)?;

        let mut y = 0.0;
        for entry in rasters {
            let (raster_width, raster_height) = (entry.width as f64, entry.height as f64);
            let x = ((viewport.width - raster_width) / 2.0).max(0.0);
            let dst = Rect::new(x, y, raster_width, raster_height);
            surface.draw_image(&entry.raster, Rect::of_size(entry.width, entry.height), dst);
            y += raster_height;
        }

        Ok(Rect::new(0.0, draw_origin_y, viewport.width, window))
    }

    /// Laid out once per load; later draws reuse the first placement
    fn draw_single_image(
        &mut self,
        key: SurfaceKey,
        draw_origin_y: f64,
        entry: &CacheEntry,
        frame: &FrameLayout,
    ) -> Result<BoundingBox, RenderError> {
        if let Some(bounding_box) = self.single_images.get(&key) {
            trace!(?key, "single image already laid out");
            return Ok(*bounding_box);
        }

        let placement = freeform::place(
            entry.width as f64,
            entry.height as f64,
            frame.viewport,
            frame.scale_rate,
            0.0,
            &self.thresholds,
        );
        debug!(?key, strategy = ?placement.strategy, "single image placed");

        let (width, height) = placement.surface.to_pixels();
        let surface = self.prepare_surface(key, width, height)?;
        surface.draw_image(&entry.raster, Rect::of_size(entry.width, entry.height), placement.dst);

        let bounding_box = offset(placement.dst, draw_origin_y);
        self.single_images.insert(key, bounding_box);
        Ok(bounding_box)
    }

    /// Every image placed by the decision table, one cell after another
    fn draw_freeform(
        &mut self,
        key: SurfaceKey,
        draw_origin_y: f64,
        rasters: &[&CacheEntry],
        frame: &FrameLayout,
    ) -> Result<BoundingBox, RenderError> {
        let mut cursor = 0.0;
        let mut needed = Size::new(frame.viewport.width, 0.0);
        let mut placements = Vec::with_capacity(rasters.len());

        for entry in rasters {
            let placement = freeform::place(
                entry.width as f64,
                entry.height as f64,
                frame.viewport,
                frame.scale_rate,
                cursor,
                &self.thresholds,
            );

            // The placement's surface ends where the next cell starts.
            cursor = placement.surface.height;
            needed.width = needed.width.max(placement.surface.width);
            needed.height = needed.height.max(placement.surface.height);
            placements.push(placement);
        }

        let (width, height) = needed.to_pixels();
        let surface = self.prepare_surface(key, width, height)?;

        for (entry, placement) in rasters.iter().zip(&placements) {
            surface.draw_image(&entry.raster, Rect::of_size(entry.width, entry.height), placement.dst);
        }

        let first = placements[0].dst;
        let bounds = placements.iter().skip(1).fold(first, |bounds, placement| bounds.union(&placement.dst));
        Ok(offset(bounds, draw_origin_y))
    }

    /// Surface for `key` at exactly `width`x`height`, cleared for a new window
    fn prepare_surface(
        &mut self,
        key: SurfaceKey,
        width: u32,
        height: u32,
    ) -> Result<&mut F::Surface, RenderError> {
        self.factory.check_size(width, height)?;

        match self.surfaces.entry(key) {
            Entry::Occupied(entry) => {
                let surface = entry.into_mut();
                if (surface.width(), surface.height()) != (width, height) {
                    trace!(?key, width, height, "resizing drawing surface");
                    surface.resize(width, height);
                }
                surface.clear();
                Ok(surface)
            }
            Entry::Vacant(entry) => {
                debug!(?key, width, height, "creating drawing surface");
                let surface = self.factory.create_surface(key, width, height)?;
                Ok(entry.insert(surface))
            }
        }
    }
}

fn offset(rect: Rect, dy: f64) -> Rect {
    Rect::new(rect.x, rect.y + dy, rect.width, rect.height)
}
