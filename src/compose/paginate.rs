use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// `page` and `limit` as they arrive in a query string.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `limit` into `1..=MAX_LIMIT`.
    pub fn new(page: i64, limit: i64) -> PageRequest {
        PageRequest {
            page: page.max(1) as u64,
            limit: (limit.max(1) as u64).min(MAX_LIMIT),
        }
    }

    fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(
            query.page.unwrap_or(DEFAULT_PAGE as i64),
            query.limit.unwrap_or(DEFAULT_LIMIT as i64),
        )
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn map_docs<U, E, F>(self, f: F) -> Result<Page<U>, E>
    where
        F: FnOnce(Vec<T>) -> Result<Vec<U>, E>,
    {
        Ok(Page {
            docs: f(self.docs)?,
            total_docs: self.total_docs,
            total_pages: self.total_pages,
            page: self.page,
            limit: self.limit,
            has_next: self.has_next,
            has_prev: self.has_prev,
        })
    }
}

/// Windows an already filtered and sorted base set.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total_docs = items.len() as u64;
    let total_pages = (total_docs + request.limit - 1) / request.limit;
    let docs = items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit as usize)
        .collect();
    Page {
        docs,
        total_docs,
        total_pages,
        page: request.page,
        limit: request.limit,
        has_next: request.page < total_pages,
        has_prev: request.page > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_page_of_fifteen() {
        let page = paginate((0..15).collect::<Vec<_>>(), PageRequest::new(2, 10));
        assert_eq!(page.docs, (10..15).collect::<Vec<_>>());
        assert_eq!(page.total_docs, 15);
        assert_eq!(page.total_pages, 2);
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn first_page_has_next() {
        let page = paginate((0..15).collect::<Vec<_>>(), PageRequest::new(1, 10));
        assert_eq!(page.docs.len(), 10);
        assert!(page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn clamps_bad_input() {
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(-3, 5000), PageRequest { page: 1, limit: MAX_LIMIT });
        let defaults: PageRequest = PageQuery::default().into();
        assert_eq!(defaults, PageRequest { page: 1, limit: 10 });
    }

    #[test]
    fn empty_set_and_page_past_end() {
        let empty = paginate(Vec::<u8>::new(), PageRequest::default());
        assert_eq!(empty.total_pages, 0);
        assert!(empty.docs.is_empty());
        assert!(!empty.has_next);

        let past = paginate(vec![1, 2, 3], PageRequest::new(5, 2));
        assert!(past.docs.is_empty());
        assert!(!past.has_next);
        assert!(past.has_prev);
    }
}
