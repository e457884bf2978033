pub mod notifications;
pub mod orders;
pub mod system;
pub mod users;

use common::PageRequest;
use serde::Deserialize;

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(
            query.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
    }
}
