//! Fetcher trait - outbound HTTP seam.

use async_trait::async_trait;

use crate::error::CrawlResult;
use crate::types::page::FetchedPage;

/// Fetches a single page by URL.
///
/// Implementations classify failures into [`crate::error::CrawlError`]
/// so the orchestrator can fold them into per-URL failure counts.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage>;

    /// Fetch multiple pages, skipping failures with a warning.
    async fn fetch_pages(&self, urls: &[&str]) -> CrawlResult<Vec<FetchedPage>> {
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch(url).await {
                Ok(page) => pages.push(page),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to fetch page");
                }
            }
        }
        Ok(pages)
    }
}
