//! Layout decision table for standalone images
//!
//! Rules are evaluated in order and the first match wins, so the small-image
//! size check takes precedence over the aspect-ratio check.

use crate::surface::{Rect, Size};
use serde::{Deserialize, Serialize};

/// Which rule of the table placed an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeformStrategy {
    /// Small image scaled up to the reference box and centred
    SmallImage,
    /// Very wide scan scaled by the document rate, top-aligned
    WideScan,
    /// Moderate aspect ratio fitted into the viewport and centred
    FitViewport,
    /// Tall image scaled by the document rate, top-aligned without centring
    TopAligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeformThresholds {
    pub small_width: f64,
    pub small_height: f64,
    pub wide_scan_width: f64,
    pub max_fit_aspect: f64,
}

impl Default for FreeformThresholds {
    fn default() -> Self {
        Self { small_width: 640.0, small_height: 400.0, wide_scan_width: 1440.0, max_fit_aspect: 2.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FreeformPlacement {
    pub strategy: FreeformStrategy,
    /// Where the image lands on the surface
    pub dst: Rect,
    /// Surface size needed to hold the placement
    pub surface: Size,
}

/// Place an image of `width`x`height` in a `viewport`.
///
/// `global_rate` is the document's content-to-viewport scale and `origin_y` the
/// vertical offset the image is drawn from.
pub fn place(
    width: f64,
    height: f64,
    viewport: Size,
    global_rate: f64,
    origin_y: f64,
    thresholds: &FreeformThresholds,
) -> FreeformPlacement {
    if width < thresholds.small_width && height < thresholds.small_height {
        let rate = fit_rate(width, height, thresholds.small_width, thresholds.small_height);
        return centred(FreeformStrategy::SmallImage, width * rate, height * rate, viewport, origin_y);
    }

    if width > thresholds.wide_scan_width {
        let (scaled_width, scaled_height) = (width * global_rate, height * global_rate);
        let x = ((viewport.width - scaled_width) / 2.0).max(0.0);
        return FreeformPlacement {
            strategy: FreeformStrategy::WideScan,
            dst: Rect::new(x, origin_y, scaled_width, scaled_height),
            surface: Size::new(viewport.width.max(scaled_width), origin_y + scaled_height),
        };
    }

    if height / width <= thresholds.max_fit_aspect {
        let rate = fit_rate(width, height, viewport.width, viewport.height);
        return centred(FreeformStrategy::FitViewport, width * rate, height * rate, viewport, origin_y);
    }

    let (scaled_width, scaled_height) = (width * global_rate, height * global_rate);
    FreeformPlacement {
        strategy: FreeformStrategy::TopAligned,
        dst: Rect::new(0.0, origin_y, scaled_width, scaled_height),
        surface: Size::new(viewport.width.max(scaled_width), origin_y + scaled_height),
    }
}

/// Space one image takes in the stack: the width it needs and the height the
/// next image starts below it.
///
/// Centred placements take one viewport-height cell; top-aligned ones take
/// their scaled height.
pub fn cell_size(
    width: f64,
    height: f64,
    viewport: Size,
    global_rate: f64,
    thresholds: &FreeformThresholds,
) -> Size {
    place(width, height, viewport, global_rate, 0.0, thresholds).surface
}

/// Uniform scale that fits `width`x`height` inside `box_width`x`box_height`
pub fn fit_rate(width: f64, height: f64, box_width: f64, box_height: f64) -> f64 {
    if width <= 0.0 || height <= 0.0 {
        return 1.0;
    }

    (box_width / width).min(box_height / height)
}

fn centred(
    strategy: FreeformStrategy,
    width: f64,
    height: f64,
    viewport: Size,
    origin_y: f64,
) -> FreeformPlacement {
    let x = (viewport.width - width) / 2.0;
    let y = origin_y + (viewport.height - height) / 2.0;

    FreeformPlacement {
        strategy,
        dst: Rect::new(x, y, width, height),
        surface: Size::new(viewport.width, origin_y + viewport.height),
    }
}
