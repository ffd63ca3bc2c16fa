//! Virtual-page viewport: page index, viewport geometry and the controller
//! that drives fetching and compositing for one scroll container.
//!
//! ```
//! use doc_model::{Document, DocumentId, RenderMode};
//! use viewer_core::{PageIndex, ViewerConfig};
//!
//! let document = Document::builder(DocumentId(1), RenderMode::Tiled)
//!     .virtual_page_height(ViewerConfig::default().virtual_page_height)
//!     .page(800.0, 3000.0)
//!     .build()
//!     .unwrap();
//! let index = PageIndex::new(&document);
//!
//! assert_eq!(index.virtual_page_count(), 3);
//! assert_eq!(index.virtual_page_at(2100.0), 3);
//! ```

mod config;
mod controller;
mod index;
pub mod synthetic;
mod viewport;

pub use config::{ConfigError, ViewerConfig, MIN_VIRTUAL_PAGE_HEIGHT};
pub use controller::{DrawOutcome, ViewportController};
pub use index::PageIndex;
pub use synthetic::SyntheticProvider;
pub use viewport::{
    fit_page_rate, fit_width_rate, scale_rate_for, target_real_pages, ContentLayout, ViewportState,
};

use doc_model::DocModelError;
use pageview_render::RenderError;
use pageview_scheduler::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Document(#[from] DocModelError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
