// src/pagination.rs
use serde::Serialize;

use crate::models::ProductListItem;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pagination {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(total_items: i64, limit: i64, offset: i64) -> Self {
        let limit = limit.max(1);
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + limit - 1) / limit
        };
        Self {
            total_items,
            total_pages,
            current_page: offset.max(0) / limit + 1,
            per_page: limit,
        }
    }
}

/// One page of the public catalog; the unit stored in the listing cache.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedProducts {
    pub products: Vec<ProductListItem>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up() {
        let p = Pagination::new(21, 10, 20);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.current_page, 3);
        assert_eq!(p.per_page, 10);
    }

    #[test]
    fn empty_result_has_no_pages() {
        let p = Pagination::new(0, 12, 0);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.current_page, 1);
    }
}
