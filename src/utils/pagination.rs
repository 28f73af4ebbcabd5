use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// 1-based page request, clamped into range by [`Pagination::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Out-of-range values fall back to the defaults; `limit` is capped at [`MAX_LIMIT`].
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p,
            _ => DEFAULT_PAGE,
        };
        let limit = match limit {
            Some(l) if l >= 1 => l.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    /// Saturates for page numbers past the addressable range.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let total_pages = (total + self.limit - 1) / self.limit;
        PageMeta {
            page: self.page,
            limit: self.limit,
            total,
            total_pages,
            has_next: self.page < total_pages,
            has_prev: self.page > 1,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Raw `?page=&limit=` query string.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl From<PageParams> for Pagination {
    fn from(params: PageParams) -> Self {
        Pagination::new(params.page, params.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_or_invalid_values() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 10 });
        assert_eq!(
            Pagination::new(Some(0), Some(-5)),
            Pagination { page: 1, limit: 10 }
        );
    }

    #[test]
    fn test_limit_is_capped() {
        assert_eq!(Pagination::new(Some(3), Some(500)).limit, MAX_LIMIT);
    }

    #[test]
    fn test_offset_and_meta() {
        let p = Pagination::new(Some(2), Some(10));
        assert_eq!(p.offset(), 10);

        let meta = p.meta(25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let last = Pagination::new(Some(3), Some(10)).meta(25);
        assert!(!last.has_next);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let p = Pagination::new(Some(i64::MAX), Some(10));
        assert_eq!(p.offset(), i64::MAX);

        let meta = p.meta(25);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
    }

    #[test]
    fn test_meta_with_no_results() {
        let meta = Pagination::default().meta(0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }
}
