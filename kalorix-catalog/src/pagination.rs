//! Pagination for the admin product list (20 rows/page)

/// Page size of the admin product list
pub const PAGE_SIZE: usize = 20;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: usize,
    pub total_pages: usize,
    /// Index of the first row on the page
    pub offset: usize,
}

impl Pagination {
    /// Rows of `items` on this page
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset.min(items.len());
        let end = (start + PAGE_SIZE).min(items.len());
        &items[start..end]
    }
}

/// Calculate pagination metadata from total results and requested page
///
/// The page is clamped to `[1, total_pages]`; an empty result has zero
/// pages and stays on page 1.
///
/// # Examples
/// ```
/// use kalorix_catalog::pagination::calculate_pagination;
///
/// // 45 results = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 2);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Out-of-bounds pages are clamped
/// let p = calculate_pagination(45, 99);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: usize, requested_page: i64) -> Pagination {
    let total_pages = total_results.div_ceil(PAGE_SIZE);
    let last = total_pages.max(1) as i64;
    let page = requested_page.clamp(1, last) as usize;
    let offset = (page - 1) * PAGE_SIZE;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(45, 2);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 20);
    }

    #[test]
    fn test_pagination_out_of_bounds() {
        let p = calculate_pagination(30, 99);
        assert_eq!(p.page, 2);
        assert_eq!(p.offset, 20);

        let p = calculate_pagination(30, -4);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 3);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_exact_page_boundary() {
        let p = calculate_pagination(40, 2);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 20);
    }

    #[test]
    fn test_slice() {
        let rows: Vec<usize> = (0..45).collect();
        assert_eq!(calculate_pagination(45, 3).slice(&rows), &[40usize, 41, 42, 43, 44]);
        assert_eq!(calculate_pagination(45, 1).slice(&rows).len(), 20);
        assert!(calculate_pagination(0, 1).slice(&Vec::<usize>::new()).is_empty());
    }
}
