//! Y-offset to page translation
//!
//! Prefix sums over real and virtual page heights, built once per document
//! load. Every lookup is a binary search over half-open ranges
//! `[before, before + height)`; offsets past the end saturate to the last
//! page and offsets before the start (or NaN) resolve to the first.

use doc_model::{Document, VirtualPageNumber};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct PageIndex {
    /// Cumulative height at the end of each real page
    real_ends: Vec<f64>,
    /// Index into `virtual_numbers` of each real page's first slice
    real_first_virtual: Vec<usize>,
    /// Cumulative height at the end of each virtual page
    virtual_ends: Vec<f64>,
    virtual_numbers: Vec<VirtualPageNumber>,
    max_page_width: f64,
}

impl PageIndex {
    pub fn new(document: &Document) -> Self {
        let pages = document.real_pages();
        let mut real_ends = Vec::with_capacity(pages.len());
        let mut real_first_virtual = Vec::with_capacity(pages.len());
        let mut virtual_ends = Vec::with_capacity(document.virtual_page_count());
        let mut virtual_numbers = Vec::with_capacity(document.virtual_page_count());

        let mut real_cursor = 0.0;
        for page in pages {
            real_first_virtual.push(virtual_numbers.len());

            // Slices are accumulated from the page start so rounding never
            // lets a slice boundary drift past its real page.
            let mut slice_cursor = real_cursor;
            for slice in &page.virtual_pages {
                slice_cursor += slice.height;
                virtual_ends.push(slice_cursor);
                virtual_numbers.push(slice.number);
            }

            real_cursor += page.height;
            real_ends.push(real_cursor);
        }

        Self {
            real_ends,
            real_first_virtual,
            virtual_ends,
            virtual_numbers,
            max_page_width: document.max_page_width(),
        }
    }

    /// Virtual page whose cumulative range contains `y`
    pub fn virtual_page_at(&self, y: f64) -> VirtualPageNumber {
        let position = locate(&self.virtual_ends, y);
        self.virtual_numbers[position.min(self.virtual_numbers.len() - 1)]
    }

    /// Virtual page numbers of the document within `[lo, hi]`, ascending
    ///
    /// Numbering may have gaps, so only pages that exist are returned.
    pub fn virtual_page_range(&self, lo: VirtualPageNumber, hi: VirtualPageNumber) -> Vec<VirtualPageNumber> {
        let start = self.virtual_numbers.partition_point(|&number| number < lo);
        let end = self.virtual_numbers.partition_point(|&number| number <= hi);
        self.virtual_numbers[start..end.max(start)].to_vec()
    }

    /// 0-based real page whose cumulative range contains `y`
    pub fn real_page_index_at(&self, y: f64) -> usize {
        locate(&self.real_ends, y).min(self.real_ends.len() - 1)
    }

    /// Sum of the heights of all real pages before `index`
    ///
    /// Indices past the end saturate to the total height.
    pub fn cumulative_height_before_real_page(&self, index: usize) -> f64 {
        match index {
            0 => 0.0,
            index => self.real_ends[index.min(self.real_ends.len()) - 1],
        }
    }

    /// Virtual page numbers owned by the real pages in `range`, ascending
    pub fn virtual_pages_in_real_range(&self, range: Range<usize>) -> Vec<VirtualPageNumber> {
        let end = range.end.min(self.real_page_count());
        let start = range.start.min(end);
        if start == end {
            return Vec::new();
        }

        let first = self.real_first_virtual[start];
        let last = self.real_first_virtual.get(end).copied().unwrap_or(self.virtual_numbers.len());
        self.virtual_numbers[first..last].to_vec()
    }

    pub fn total_height(&self) -> f64 {
        self.real_ends.last().copied().unwrap_or_default()
    }

    pub fn max_page_width(&self) -> f64 {
        self.max_page_width
    }

    pub fn real_page_count(&self) -> usize {
        self.real_ends.len()
    }

    pub fn virtual_page_count(&self) -> usize {
        self.virtual_numbers.len()
    }
}

/// Number of ranges ending at or before `y`, i.e. the index of the range
/// containing it. NaN compares false and lands on the first range.
fn locate(ends: &[f64], y: f64) -> usize {
    ends.partition_point(|&end| end <= y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{DocumentId, RealPage, RenderMode, VirtualPage};

    fn sliced(heights: &[f64]) -> Document {
        let virtual_pages = heights
            .iter()
            .enumerate()
            .map(|(index, &height)| VirtualPage { number: index as u32 + 1, height })
            .collect();
        let page = RealPage { width: 600.0, height: heights.iter().sum(), virtual_pages };

        Document::new(DocumentId(1), RenderMode::Tiled, vec![page]).unwrap()
    }

    fn tiled(heights: &[f64], slice: f64) -> Document {
        heights
            .iter()
            .fold(Document::builder(DocumentId(1), RenderMode::Tiled), |builder, &height| {
                builder.page(600.0, height)
            })
            .virtual_page_height(slice)
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_inside_second_slice() {
        let index = PageIndex::new(&sliced(&[100.0, 100.0, 150.0]));
        assert_eq!(index.virtual_page_at(150.0), 2);
    }

    #[test]
    fn lookup_past_the_end_clamps_to_last() {
        let index = PageIndex::new(&sliced(&[100.0, 100.0, 150.0]));

        assert_eq!(index.virtual_page_at(1000.0), 3);
        assert_eq!(index.virtual_page_at(350.0), 3);
        assert_eq!(index.virtual_page_at(f64::INFINITY), 3);
    }

    #[test]
    fn boundaries_belong_to_the_following_page() {
        let index = PageIndex::new(&sliced(&[100.0, 100.0, 150.0]));

        assert_eq!(index.virtual_page_at(0.0), 1);
        assert_eq!(index.virtual_page_at(99.999), 1);
        assert_eq!(index.virtual_page_at(100.0), 2);
        assert_eq!(index.virtual_page_at(200.0), 3);
    }

    #[test]
    fn negative_and_nan_offsets_resolve_to_first() {
        let index = PageIndex::new(&sliced(&[100.0, 100.0, 150.0]));

        assert_eq!(index.virtual_page_at(-5.0), 1);
        assert_eq!(index.virtual_page_at(f64::NAN), 1);
        assert_eq!(index.real_page_index_at(f64::NAN), 0);
    }

    #[test]
    fn every_offset_is_covered_by_its_page() {
        let document = tiled(&[1500.0, 500.0, 3000.0], 512.0);
        let index = PageIndex::new(&document);

        let mut before = 0.0;
        let mut ranges = Vec::new();
        for page in document.virtual_pages() {
            ranges.push((page.number, before, before + page.height));
            before += page.height;
        }

        let mut y = 0.0;
        while y < index.total_height() {
            let number = index.virtual_page_at(y);
            let (_, start, end) = ranges.iter().find(|(n, _, _)| *n == number).copied().unwrap();
            assert!(start <= y && y < end, "y={y} not in page {number} [{start}, {end})");
            y += 37.5;
        }
    }

    #[test]
    fn partition_matches_real_pages() {
        let document = tiled(&[1500.0, 500.0, 3000.0], 512.0);

        for page in document.real_pages() {
            assert!((page.virtual_height() - page.height).abs() < 1e-9);
        }
        assert_eq!(PageIndex::new(&document).total_height(), 5000.0);
    }

    #[test]
    fn real_page_lookup_and_prefix_sums() {
        let index = PageIndex::new(&tiled(&[400.0, 400.0, 400.0], 1024.0));

        assert_eq!(index.real_page_index_at(0.0), 0);
        assert_eq!(index.real_page_index_at(400.0), 1);
        assert_eq!(index.real_page_index_at(1199.0), 2);
        assert_eq!(index.real_page_index_at(5000.0), 2);

        assert_eq!(index.cumulative_height_before_real_page(0), 0.0);
        assert_eq!(index.cumulative_height_before_real_page(2), 800.0);
        assert_eq!(index.cumulative_height_before_real_page(3), 1200.0);
        assert_eq!(index.cumulative_height_before_real_page(99), 1200.0);
    }

    #[test]
    fn virtual_pages_of_real_range() {
        // 1500 -> 3 slices, 500 -> 1 slice, 3000 -> 6 slices
        let index = PageIndex::new(&tiled(&[1500.0, 500.0, 3000.0], 512.0));

        assert_eq!(index.virtual_page_count(), 10);
        assert_eq!(index.virtual_pages_in_real_range(0..1), vec![1, 2, 3]);
        assert_eq!(index.virtual_pages_in_real_range(1..3), vec![4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(index.virtual_pages_in_real_range(2..9), vec![5, 6, 7, 8, 9, 10]);
        assert!(index.virtual_pages_in_real_range(3..5).is_empty());
    }

    #[test]
    fn range_is_inclusive() {
        let index = PageIndex::new(&sliced(&[100.0, 100.0, 150.0]));

        assert_eq!(index.virtual_page_range(1, 3), vec![1, 2, 3]);
        assert_eq!(index.virtual_page_range(2, 2), vec![2]);
        assert!(index.virtual_page_range(3, 2).is_empty());
    }

    #[test]
    fn range_skips_numbers_missing_from_the_document() {
        let pages = [2, 5, 9]
            .into_iter()
            .map(|number| RealPage {
                width: 600.0,
                height: 100.0,
                virtual_pages: vec![VirtualPage { number, height: 100.0 }],
            })
            .collect();
        let document = Document::new(DocumentId(1), RenderMode::Tiled, pages).unwrap();
        let index = PageIndex::new(&document);

        assert_eq!(index.virtual_page_range(2, 9), vec![2, 5, 9]);
        assert_eq!(index.virtual_page_range(1, 5), vec![2, 5]);
        assert!(index.virtual_page_range(3, 4).is_empty());
        assert!(index.virtual_page_range(10, 20).is_empty());
    }
}
