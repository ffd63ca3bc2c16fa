use crate::index::PageIndex;
use doc_model::{Document, RenderMode};
use pageview_render::freeform::{self, FreeformThresholds};
use pageview_render::Size;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub scroll_offset_y: f64,
    pub container_width: f64,
    pub container_height: f64,
    /// Content-to-viewport scale of the loaded document
    pub scale_rate: f64,
    /// Real pages loaded through `load_initial_pages` so far
    pub loaded_page_count: usize,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scroll_offset_y: 0.0,
            container_width: 1280.0,
            container_height: 800.0,
            scale_rate: 1.0,
            loaded_page_count: 0,
        }
    }
}

pub fn fit_width_rate(viewport_width: f64, page_width: f64) -> f64 {
    if !(viewport_width > 0.0 && page_width > 0.0) || !viewport_width.is_finite() {
        return 1.0;
    }

    viewport_width / page_width
}

pub fn fit_page_rate(
    viewport_width: f64,
    viewport_height: f64,
    page_width: f64,
    page_height: f64,
) -> f64 {
    if !(viewport_width > 0.0 && viewport_height > 0.0 && page_width > 0.0 && page_height > 0.0)
        || !viewport_width.is_finite()
        || !viewport_height.is_finite()
    {
        return 1.0;
    }

    (viewport_width / page_width).min(viewport_height / page_height)
}

/// Scale rate for `document` in a `width`x`height` container
///
/// Slides fit their first page inside the container; every other mode fits
/// the widest page to the container width.
pub fn scale_rate_for(document: &Document, width: f64, height: f64) -> f64 {
    match document.render_mode() {
        RenderMode::SlideFit => {
            let first = document.first_page();
            fit_page_rate(width, height, first.width, first.height)
        }
        RenderMode::Tiled | RenderMode::SingleImage | RenderMode::Freeform => {
            fit_width_rate(width, document.max_page_width())
        }
    }
}

/// Where every real page sits in the scroll container, in container pixels
///
/// Most modes scale native page heights by the scale rate. Freeform images
/// are stacked one layout cell each, and a cell depends on the container
/// size, so the layout is rebuilt whenever the container changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLayout {
    /// Scaled offset of the end of each real page
    ends: Vec<f64>,
    width: f64,
}

impl ContentLayout {
    /// Layout of `document` for the container described by `state`
    pub fn new(
        document: &Document,
        index: &PageIndex,
        state: &ViewportState,
        thresholds: &FreeformThresholds,
    ) -> Self {
        match document.render_mode() {
            RenderMode::Freeform => {
                let viewport = Size::new(state.container_width, state.container_height);
                Self::freeform(document, viewport, state.scale_rate, thresholds)
            }
            RenderMode::Tiled | RenderMode::SlideFit | RenderMode::SingleImage => {
                Self::scaled(index, state.scale_rate)
            }
        }
    }

    /// Native page heights multiplied by `scale_rate`
    pub fn scaled(index: &PageIndex, scale_rate: f64) -> Self {
        let rate = if scale_rate.is_finite() && scale_rate > 0.0 { scale_rate } else { 1.0 };
        let ends = (1..=index.real_page_count())
            .map(|count| index.cumulative_height_before_real_page(count) * rate)
            .collect();

        Self { ends, width: index.max_page_width() * rate }
    }

    /// Images stacked by the freeform layout table
    pub fn freeform(
        document: &Document,
        viewport: Size,
        global_rate: f64,
        thresholds: &FreeformThresholds,
    ) -> Self {
        let mut ends = Vec::with_capacity(document.real_page_count());
        let mut width = 0.0_f64;
        let mut cursor = 0.0;

        for page in document.real_pages() {
            let cell = freeform::cell_size(page.width, page.height, viewport, global_rate, thresholds);
            cursor += cell.height;
            width = width.max(cell.width);
            ends.push(cursor);
        }

        Self { ends, width }
    }

    /// 0-based real page whose scaled range contains `y`, clamped like
    /// [`PageIndex::real_page_index_at`]
    pub fn real_page_index_at(&self, y: f64) -> usize {
        self.ends.partition_point(|&end| end <= y).min(self.ends.len().saturating_sub(1))
    }

    /// Scaled offset at which real page `index` starts
    pub fn offset_before(&self, index: usize) -> f64 {
        match index {
            0 => 0.0,
            index => self.ends[index.min(self.ends.len()) - 1],
        }
    }

    /// Size of the whole scroll container content
    pub fn size(&self) -> Size {
        Size::new(self.width, self.ends.last().copied().unwrap_or_default())
    }

    pub fn real_page_count(&self) -> usize {
        self.ends.len()
    }
}

/// Real pages to fetch for a viewport, including the look-ahead margin
///
/// Offsets are in scaled (container) units, the same units as `layout`. The
/// range is never empty.
pub fn target_real_pages(
    layout: &ContentLayout,
    scroll_offset_y: f64,
    container_height: f64,
    look_ahead_pages: usize,
) -> Range<usize> {
    let start = layout.real_page_index_at(scroll_offset_y);
    let visible_end = layout.real_page_index_at(scroll_offset_y + container_height);
    let end = visible_end.saturating_add(look_ahead_pages).min(layout.real_page_count());

    start..end.max(start + 1)
}
