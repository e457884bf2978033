//! Limit/offset paging.

use serde::{Deserialize, Serialize};

/// A limit/offset window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum number of rows to return.
    pub limit: usize,
    /// Number of rows to skip.
    pub offset: usize,
}

impl PageRequest {
    /// Default page size when the caller does not pass a limit.
    pub const DEFAULT_LIMIT: usize = 10;

    /// Upper bound applied to caller-supplied limits.
    pub const MAX_LIMIT: usize = 100;

    /// Creates a page request, clamping the limit to `1..=MAX_LIMIT`.
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }

    /// Applies the window to an already ordered iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// One page of results together with the total row count for the same filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    /// Maps the items, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(500, 0).limit, PageRequest::MAX_LIMIT);
    }

    #[test]
    fn test_apply_skips_and_takes() {
        let page = PageRequest::new(2, 1);
        assert_eq!(page.apply(1..=5), vec![2, 3]);
        assert!(PageRequest::new(10, 9).apply(1..=5).is_empty());
    }
}
