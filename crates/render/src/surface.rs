//! Drawing surfaces
//!
//! A drawing surface is the raster target the compositor paints page rasters
//! onto. Hosts provide their own implementation (a canvas, a GPU texture); the
//! [`RasterSurface`] here is backed by an in-memory RGBA image.

use doc_model::DocumentId;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::Serialize;

/// Axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole raster of the given size
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }
}

/// Visible region of drawn content, in viewport coordinates
pub type BoundingBox = Rect;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whole pixel dimensions large enough to hold this size
    pub fn to_pixels(self) -> (u32, u32) {
        (to_pixels(self.width), to_pixels(self.height))
    }
}

pub(crate) fn to_pixels(value: f64) -> u32 {
    if value.is_finite() {
        value.max(0.0).ceil() as u32
    } else {
        0
    }
}

/// Identity of a surface: one per document and viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    pub document_id: DocumentId,
    pub viewport_index: u32,
}

impl SurfaceKey {
    pub fn new(document_id: DocumentId, viewport_index: u32) -> Self {
        Self { document_id, viewport_index }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("viewport {width}x{height} cannot hold any content")]
    InvalidViewport { width: f64, height: f64 },
    #[error("surface of {width}x{height} pixels exceeds the limit of {limit} pixels")]
    SurfaceTooLarge { width: u32, height: u32, limit: u64 },
}

/// Raster target the compositor paints into
pub trait DrawingSurface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Change the surface size. Content inside the new bounds is kept.
    fn resize(&mut self, width: u32, height: u32);

    /// Make every pixel transparent.
    fn clear(&mut self);

    /// Draw the `src` region of `raster` scaled into `dst`.
    fn draw_image(&mut self, raster: &RgbaImage, src: Rect, dst: Rect);
}

/// Creates surfaces on first use of a [`SurfaceKey`]
pub trait SurfaceFactory {
    type Surface: DrawingSurface;

    /// Reject dimensions the backing store cannot hold. Checked before a
    /// surface is created and before an existing one is resized.
    fn check_size(&self, _width: u32, _height: u32) -> Result<(), RenderError> {
        Ok(())
    }

    fn create_surface(
        &mut self,
        key: SurfaceKey,
        width: u32,
        height: u32,
    ) -> Result<Self::Surface, RenderError>;
}

/// In-memory RGBA surface
#[derive(Debug, Clone)]
pub struct RasterSurface {
    canvas: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { canvas: RgbaImage::new(width, height) }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }
}

impl DrawingSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() == (width, height) {
            return;
        }

        let mut canvas = RgbaImage::new(width, height);
        imageops::replace(&mut canvas, &self.canvas, 0, 0);
        self.canvas = canvas;
    }

    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_image(&mut self, raster: &RgbaImage, src: Rect, dst: Rect) {
        let (raster_width, raster_height) = raster.dimensions();

        let src_x = to_pixels(src.x.floor()).min(raster_width);
        let src_y = to_pixels(src.y.floor()).min(raster_height);
        let src_width = to_pixels(src.width).min(raster_width - src_x);
        let src_height = to_pixels(src.height).min(raster_height - src_y);

        let dst_width = dst.width.round().max(0.0) as u32;
        let dst_height = dst.height.round().max(0.0) as u32;

        if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
            return;
        }

        let region = imageops::crop_imm(raster, src_x, src_y, src_width, src_height).to_image();
        let region = if (src_width, src_height) == (dst_width, dst_height) {
            region
        } else {
            imageops::resize(&region, dst_width, dst_height, FilterType::Triangle)
        };

        imageops::replace(&mut self.canvas, &region, dst.x.round() as i64, dst.y.round() as i64);
    }
}

/// Factory for [`RasterSurface`] with an upper bound on surface area
#[derive(Debug, Clone, Copy)]
pub struct RasterSurfaceFactory {
    pub max_pixels: u64,
}

impl Default for RasterSurfaceFactory {
    fn default() -> Self {
        Self { max_pixels: 64 * 1024 * 1024 }
    }
}

impl SurfaceFactory for RasterSurfaceFactory {
    type Surface = RasterSurface;

    fn check_size(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(RenderError::SurfaceTooLarge { width, height, limit: self.max_pixels });
        }

        Ok(())
    }

    fn create_surface(
        &mut self,
        _key: SurfaceKey,
        width: u32,
        height: u32,
    ) -> Result<RasterSurface, RenderError> {
        self.check_size(width, height)?;
        Ok(RasterSurface::new(width, height))
    }
}
