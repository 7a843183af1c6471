//! Chunked retrieval of record sets larger than one store page.

use std::future::Future;

use service_core::error::AppError;
use tracing::{debug, error};

use crate::config::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::error::LedgerError;
use crate::services::metrics::record_retrieval_page;

/// Walks offset windows until a short page. Any failure part-way through
/// surfaces as [`LedgerError::IncompleteRetrieval`]; partial data is never
/// returned.
#[derive(Debug, Clone, Copy)]
pub struct BulkRetriever {
    page_size: usize,
    max_pages: usize,
}

impl Default for BulkRetriever {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES)
    }
}

impl BulkRetriever {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn fetch_all<T, F, Fut>(
        &self,
        resource: &'static str,
        mut fetch: F,
    ) -> Result<Vec<T>, LedgerError>
    where
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Vec<T>, AppError>>,
    {
        let mut rows = Vec::new();
        let mut pages = 0;

        loop {
            let offset = rows.len();
            if pages == self.max_pages {
                error!(resource, offset, pages, "Retrieval exceeded page limit");
                return Err(LedgerError::IncompleteRetrieval {
                    resource,
                    offset,
                    fetched: offset,
                    reason: format!("exceeded {} pages", self.max_pages),
                });
            }

            let page = fetch(offset, self.page_size).await.map_err(|e| {
                error!(
                    resource,
                    offset,
                    transient = e.is_transient(),
                    error = %e,
                    "Retrieval page failed"
                );
                LedgerError::IncompleteRetrieval {
                    resource,
                    offset,
                    fetched: offset,
                    reason: e.to_string(),
                }
            })?;
            pages += 1;
            record_retrieval_page(resource);

            let len = page.len();
            if len > self.page_size {
                error!(resource, offset, len, "Store returned more rows than requested");
                return Err(LedgerError::IncompleteRetrieval {
                    resource,
                    offset,
                    fetched: offset,
                    reason: format!("page of {} rows exceeds limit {}", len, self.page_size),
                });
            }

            rows.extend(page);
            if len < self.page_size {
                break;
            }
        }

        debug!(resource, rows = rows.len(), pages, "Retrieval complete");
        Ok(rows)
    }
}
