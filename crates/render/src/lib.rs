//! Page Render Library
//!
//! Drawing surfaces, the page compositor and the freeform image layout table.

pub mod compositor;
pub mod freeform;
pub mod surface;

pub use compositor::{Compositor, FrameLayout};
pub use freeform::{FreeformPlacement, FreeformStrategy, FreeformThresholds};
pub use surface::{
    BoundingBox, DrawingSurface, RasterSurface, RasterSurfaceFactory, Rect, RenderError, Size,
    SurfaceFactory, SurfaceKey,
};
