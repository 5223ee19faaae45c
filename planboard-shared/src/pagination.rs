/// Pagination types shared by every list endpoint
///
/// Pages are 1-based. `limit` is bounded to keep list queries cheap.
///
/// # Example
///
/// ```
/// use planboard_shared::pagination::{Page, PageRequest};
///
/// let request = PageRequest::new(2, 10).unwrap();
/// assert_eq!(request.offset(), 10);
///
/// let page = Page::new(vec!["a", "b"], request, 12);
/// assert_eq!(page.pagination.total_pages, 2);
/// ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default page size when the client doesn't ask for one
pub const DEFAULT_LIMIT: u32 = 20;

/// Largest page a client may request
pub const MAX_LIMIT: u32 = 100;

/// Error for out-of-range page parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page must be at least 1")]
    InvalidPage,

    #[error("limit must be between 1 and 100")]
    InvalidLimit,
}

impl PageError {
    /// Name of the offending query parameter
    pub fn field(&self) -> &'static str {
        match self {
            PageError::InvalidPage => "page",
            PageError::InvalidLimit => "limit",
        }
    }
}

/// A validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Validates `page` and `limit`
    pub fn new(page: u32, limit: u32) -> Result<Self, PageError> {
        if page < 1 {
            return Err(PageError::InvalidPage);
        }
        if limit < 1 || limit > MAX_LIMIT {
            return Err(PageError::InvalidLimit);
        }
        Ok(Self { page, limit })
    }

    /// Builds a request from optional query parameters, applying defaults
    pub fn from_query(page: Option<u32>, limit: Option<u32>) -> Result<Self, PageError> {
        Self::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_LIMIT))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// SQL `LIMIT` value
    pub fn sql_limit(&self) -> i64 {
        i64::from(self.limit)
    }

    /// SQL `OFFSET` value
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Pagination metadata returned alongside every page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, request: PageRequest, total: i64) -> Self {
        let limit = i64::from(request.limit);
        let total = total.max(0);

        Self {
            data,
            pagination: PageMeta {
                page: request.page,
                limit: request.limit,
                total,
                total_pages: (total + limit - 1) / limit,
            },
        }
    }

    /// Converts every item, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = PageRequest::from_query(None, None).unwrap();
        assert_eq!(request.page(), 1);
        assert_eq!(request.limit(), DEFAULT_LIMIT);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(PageRequest::new(0, 10), Err(PageError::InvalidPage));
        assert_eq!(PageRequest::new(1, 0), Err(PageError::InvalidLimit));
        assert_eq!(PageRequest::new(1, MAX_LIMIT + 1), Err(PageError::InvalidLimit));
        assert!(PageRequest::new(1, MAX_LIMIT).is_ok());
    }

    #[test]
    fn test_offset() {
        let request = PageRequest::new(3, 25).unwrap();
        assert_eq!(request.offset(), 50);
        assert_eq!(request.sql_limit(), 25);
    }

    #[test]
    fn test_total_pages() {
        let request = PageRequest::new(1, 10).unwrap();
        assert_eq!(Page::<u8>::new(vec![], request, 0).pagination.total_pages, 0);
        assert_eq!(Page::<u8>::new(vec![], request, 1).pagination.total_pages, 1);
        assert_eq!(Page::<u8>::new(vec![], request, 10).pagination.total_pages, 1);
        assert_eq!(Page::<u8>::new(vec![], request, 11).pagination.total_pages, 2);
    }

    #[test]
    fn test_page_past_the_end_keeps_totals() {
        let request = PageRequest::new(5, 10).unwrap();
        let page = Page::<u8>::new(vec![], request, 12);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 12);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.pagination.page, 5);
    }

    #[test]
    fn test_map_keeps_meta() {
        let request = PageRequest::new(1, 2).unwrap();
        let page = Page::new(vec![1, 2], request, 3).map(|n| n * 10);
        assert_eq!(page.data, vec![10, 20]);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn test_serialized_shape() {
        let request = PageRequest::new(1, 2).unwrap();
        let json = serde_json::to_value(Page::new(vec!["x"], request, 1)).unwrap();
        assert_eq!(json["data"][0], "x");
        assert_eq!(json["pagination"]["total"], 1);
        assert_eq!(json["pagination"]["total_pages"], 1);
    }
}
