//! Pagination for the filtered-rows table (100 rows/page)

use std::ops::Range;

/// Page size constant for all pagination
pub const PAGE_SIZE: usize = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: usize,
    pub total_pages: usize,
    /// Index of the first row on this page
    pub offset: usize,
}

impl Pagination {
    /// Row indices on this page, clipped to `total_results`
    pub fn rows(&self, total_results: usize) -> Range<usize> {
        let start = self.offset.min(total_results);
        let end = (self.offset + PAGE_SIZE).min(total_results);
        start..end
    }
}

/// Calculate pagination metadata from total results and requested page
///
/// The page is clamped into `[1, total_pages]`.
///
/// # Examples
/// ```
/// use dropout_dash::pagination::calculate_pagination;
///
/// // 250 total results = 3 pages (100 + 100 + 50)
/// let p = calculate_pagination(250, 2);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 100);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(250, 99);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 200);
/// ```
pub fn calculate_pagination(total_results: usize, requested_page: usize) -> Pagination {
    let total_pages = total_results.div_ceil(PAGE_SIZE);
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * PAGE_SIZE;

    Pagination {
        page,
        total_pages,
        offset,
    }
}
