use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique, strictly increasing page number of a virtual page.
pub type VirtualPageNumber = u32;

/// Slice height used when a document does not configure one.
pub const DEFAULT_VIRTUAL_PAGE_HEIGHT: f64 = 1024.0;

/// Upper bound on the slices one real page may be cut into.
pub const MAX_SLICES_PER_PAGE: usize = 4096;

const PARTITION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Per-document layout policy used by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// PDF-like: rasters arrive pre-scaled and are stacked at native size.
    Tiled,
    /// PPT-like: one raster per slide, fitted to the viewport.
    SlideFit,
    /// A standalone image laid out once per load.
    SingleImage,
    /// A set of standalone images, each placed by the freeform decision table.
    Freeform,
}

impl RenderMode {
    /// Only tiled documents are sliced into several virtual pages per real page.
    pub fn splits_pages(self) -> bool {
        matches!(self, Self::Tiled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualPage {
    pub number: VirtualPageNumber,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealPage {
    pub width: f64,
    pub height: f64,
    pub virtual_pages: Vec<VirtualPage>,
}

impl RealPage {
    pub fn virtual_height(&self) -> f64 {
        self.virtual_pages.iter().map(|page| page.height).sum()
    }

    pub fn first_number(&self) -> Option<VirtualPageNumber> {
        self.virtual_pages.first().map(|page| page.number)
    }

    pub fn last_number(&self) -> Option<VirtualPageNumber> {
        self.virtual_pages.last().map(|page| page.number)
    }
}

/// Where a virtual page sits inside its document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLocation {
    pub real_index: usize,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocModelError {
    #[error("document has no pages")]
    Empty,
    #[error("page {page} has invalid size {width}x{height}")]
    InvalidPageSize { page: usize, width: f64, height: f64 },
    #[error("virtual page height must be positive and finite, got {0}")]
    InvalidSliceHeight(f64),
    #[error("page {page} has no virtual pages")]
    NoVirtualPages { page: usize },
    #[error("page {page} virtual heights sum to {actual}, expected {expected}")]
    PartitionMismatch { page: usize, expected: f64, actual: f64 },
    #[error("page {page} would be cut into {count} slices, more than {MAX_SLICES_PER_PAGE}")]
    TooManySlices { page: usize, count: usize },
    #[error("virtual page {number} does not follow {previous}")]
    NonIncreasingNumber { previous: VirtualPageNumber, number: VirtualPageNumber },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    id: DocumentId,
    render_mode: RenderMode,
    real_pages: Vec<RealPage>,
}

impl Document {
    /// Validates an already partitioned page list.
    pub fn new(
        id: DocumentId,
        render_mode: RenderMode,
        real_pages: Vec<RealPage>,
    ) -> Result<Self, DocModelError> {
        if real_pages.is_empty() {
            return Err(DocModelError::Empty);
        }

        let mut previous: Option<VirtualPageNumber> = None;

        for (index, page) in real_pages.iter().enumerate() {
            validate_size(index, page.width, page.height)?;

            if page.virtual_pages.is_empty() {
                return Err(DocModelError::NoVirtualPages { page: index });
            }

            let actual = page.virtual_height();
            if (actual - page.height).abs() > PARTITION_TOLERANCE * page.height.max(1.0) {
                return Err(DocModelError::PartitionMismatch {
                    page: index,
                    expected: page.height,
                    actual,
                });
            }

            for slice in &page.virtual_pages {
                if let Some(previous) = previous {
                    if slice.number <= previous {
                        return Err(DocModelError::NonIncreasingNumber {
                            previous,
                            number: slice.number,
                        });
                    }
                }
                previous = Some(slice.number);
            }
        }

        Ok(Self { id, render_mode, real_pages })
    }

    pub fn builder(id: DocumentId, render_mode: RenderMode) -> DocumentBuilder {
        DocumentBuilder::new(id, render_mode)
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn real_pages(&self) -> &[RealPage] {
        &self.real_pages
    }

    pub fn real_page_count(&self) -> usize {
        self.real_pages.len()
    }

    pub fn virtual_page_count(&self) -> usize {
        self.real_pages.iter().map(|page| page.virtual_pages.len()).sum()
    }

    pub fn virtual_pages(&self) -> impl Iterator<Item = &VirtualPage> {
        self.real_pages.iter().flat_map(|page| page.virtual_pages.iter())
    }

    pub fn total_height(&self) -> f64 {
        self.real_pages.iter().map(|page| page.height).sum()
    }

    pub fn max_page_width(&self) -> f64 {
        self.real_pages.iter().map(|page| page.width).fold(0.0, f64::max)
    }

    pub fn first_page(&self) -> &RealPage {
        // Construction rejects empty documents.
        &self.real_pages[0]
    }

    /// Resolves a virtual page number to its owning real page and the slice's
    /// offset within it.
    pub fn locate(&self, number: VirtualPageNumber) -> Option<PageLocation> {
        for (real_index, page) in self.real_pages.iter().enumerate() {
            let (Some(first), Some(last)) = (page.first_number(), page.last_number()) else {
                continue;
            };
            if number < first || number > last {
                continue;
            }

            let mut offset_y = 0.0;
            for slice in &page.virtual_pages {
                if slice.number == number {
                    return Some(PageLocation {
                        real_index,
                        offset_y,
                        width: page.width,
                        height: slice.height,
                    });
                }
                offset_y += slice.height;
            }
        }

        None
    }
}

/// Builds a document from real page sizes, slicing each page into virtual
/// pages of at most `virtual_page_height` native units.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    id: DocumentId,
    render_mode: RenderMode,
    virtual_page_height: f64,
    first_number: VirtualPageNumber,
    sizes: Vec<PageSize>,
}

impl DocumentBuilder {
    pub fn new(id: DocumentId, render_mode: RenderMode) -> Self {
        Self {
            id,
            render_mode,
            virtual_page_height: DEFAULT_VIRTUAL_PAGE_HEIGHT,
            first_number: 1,
            sizes: Vec::new(),
        }
    }

    pub fn virtual_page_height(mut self, height: f64) -> Self {
        self.virtual_page_height = height;
        self
    }

    pub fn first_number(mut self, number: VirtualPageNumber) -> Self {
        self.first_number = number;
        self
    }

    pub fn page(mut self, width: f64, height: f64) -> Self {
        self.sizes.push(PageSize { width, height });
        self
    }

    pub fn pages(mut self, sizes: impl IntoIterator<Item = PageSize>) -> Self {
        self.sizes.extend(sizes);
        self
    }

    pub fn build(self) -> Result<Document, DocModelError> {
        if !self.virtual_page_height.is_finite() || self.virtual_page_height <= 0.0 {
            return Err(DocModelError::InvalidSliceHeight(self.virtual_page_height));
        }

        let mut next_number = self.first_number;
        let mut real_pages = Vec::with_capacity(self.sizes.len());

        for (index, size) in self.sizes.iter().enumerate() {
            validate_size(index, size.width, size.height)?;

            let slice_height = if self.render_mode.splits_pages() {
                self.virtual_page_height
            } else {
                size.height
            };

            let count = slice_count(size.height, slice_height);
            if count > MAX_SLICES_PER_PAGE {
                return Err(DocModelError::TooManySlices { page: index, count });
            }

            let virtual_pages = split_height(size.height, slice_height, count)
                .into_iter()
                .map(|height| {
                    let number = next_number;
                    next_number += 1;
                    VirtualPage { number, height }
                })
                .collect();

            real_pages.push(RealPage { width: size.width, height: size.height, virtual_pages });
        }

        Document::new(self.id, self.render_mode, real_pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Serialized form of a document: sizes only, partitioned on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub id: DocumentId,
    pub render_mode: RenderMode,
    pub pages: Vec<PageSize>,
}

impl DocumentDescriptor {
    pub fn into_document(self, virtual_page_height: f64) -> Result<Document, DocModelError> {
        Document::builder(self.id, self.render_mode)
            .virtual_page_height(virtual_page_height)
            .pages(self.pages)
            .build()
    }
}

fn validate_size(page: usize, width: f64, height: f64) -> Result<(), DocModelError> {
    let valid = |value: f64| value.is_finite() && value > 0.0;

    if valid(width) && valid(height) {
        Ok(())
    } else {
        Err(DocModelError::InvalidPageSize { page, width, height })
    }
}

// Float to int casts saturate, so absurd ratios stay comparable to the cap.
fn slice_count(height: f64, slice_height: f64) -> usize {
    (height / slice_height).ceil().max(1.0) as usize
}

fn split_height(height: f64, slice_height: f64, count: usize) -> Vec<f64> {
    let mut slices = vec![slice_height; count - 1];
    slices.push(height - slice_height * (count - 1) as f64);
    slices
}
