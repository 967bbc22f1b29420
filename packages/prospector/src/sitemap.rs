//! Sitemap resolution for crawl-type jobs.
//!
//! Sitemaps use XML namespaces that defeat HTML-oriented parsers, so
//! `<loc>` values are recovered with a direct scan, preserving document
//! order. Resolution failure is fatal to sitemap-job creation, never a
//! per-URL failure.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::traits::fetcher::Fetcher;

/// Nested `<sitemapindex>` documents are followed at most this deep.
const MAX_INDEX_DEPTH: usize = 2;

/// Cap on sitemap documents fetched per resolution.
const MAX_SITEMAPS: usize = 50;

/// Default bound on one sitemap document fetch.
pub const SITEMAP_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches a sitemap document and enumerates its URLs.
pub struct SitemapResolver {
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Duration,
    loc_pattern: Regex,
}

impl SitemapResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            fetch_timeout: SITEMAP_FETCH_TIMEOUT,
            loc_pattern: Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").expect("valid loc pattern"),
        }
    }

    /// Override the per-fetch time budget.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolve a sitemap URL into its contained page URLs.
    ///
    /// Follows one level of `<sitemapindex>` nesting; preserves
    /// document order; skips empty `<loc>` values; deduplicates while
    /// keeping first occurrence.
    pub async fn resolve(&self, sitemap_url: &str) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut fetched = 0usize;

        self.resolve_into(sitemap_url, 0, &mut fetched, &mut seen, &mut urls)
            .await?;

        debug!(sitemap = %sitemap_url, urls = urls.len(), "sitemap resolved");
        Ok(urls)
    }

    fn resolve_into<'a>(
        &'a self,
        sitemap_url: &'a str,
        depth: usize,
        fetched: &'a mut usize,
        seen: &'a mut HashSet<String>,
        urls: &'a mut Vec<String>,
    ) -> futures::future::BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if depth >= MAX_INDEX_DEPTH || *fetched >= MAX_SITEMAPS {
                return Ok(());
            }
            *fetched += 1;

            let page = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(sitemap_url))
                .await
                .map_err(|_| PipelineError::SitemapResolution {
                    url: sitemap_url.to_string(),
                    message: format!("fetch timed out after {:?}", self.fetch_timeout),
                })?
                .map_err(|e| PipelineError::SitemapResolution {
                    url: sitemap_url.to_string(),
                    message: e.to_string(),
                })?;

            let locs = self.extract_locs(&page.html);
            if locs.is_empty() {
                return Err(PipelineError::SitemapResolution {
                    url: sitemap_url.to_string(),
                    message: "no <loc> entries found".to_string(),
                });
            }

            if page.html.contains("<sitemapindex") {
                // Index document: each <loc> is itself a sitemap
                for child in locs {
                    if let Err(e) = self
                        .resolve_into(&child, depth + 1, fetched, seen, urls)
                        .await
                    {
                        // A broken child sitemap doesn't fail the whole
                        // index; the top-level document already parsed.
                        warn!(sitemap = %child, error = %e, "skipping child sitemap");
                    }
                }
            } else {
                for loc in locs {
                    if seen.insert(loc.clone()) {
                        urls.push(loc);
                    }
                }
            }

            Ok(())
        })
    }

    /// Extract `<loc>` values in document order, unescaping XML entities.
    fn extract_locs(&self, xml: &str) -> Vec<String> {
        self.loc_pattern
            .captures_iter(xml)
            .filter_map(|cap| {
                let raw = cap.get(1)?.as_str().trim();
                if raw.is_empty() {
                    return None;
                }
                Some(unescape_xml(raw))
            })
            .collect()
    }
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlResult;
    use crate::testing::MockFetcher;
    use crate::types::page::FetchedPage;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc></url>
  <url><loc> https://example.com/pricing </loc></url>
  <url><loc>https://example.com/search?q=a&amp;b</loc></url>
  <url><loc></loc></url>
  <url><loc>https://example.com/</loc></url>
</urlset>"#;

    fn resolver_with(pages: MockFetcher) -> SitemapResolver {
        SitemapResolver::new(Arc::new(pages))
    }

    #[tokio::test]
    async fn test_resolves_urls_in_order() {
        let resolver = resolver_with(
            MockFetcher::new().with_page("https://example.com/sitemap.xml", SITEMAP),
        );

        let urls = resolver
            .resolve("https://example.com/sitemap.xml")
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://example.com/",
                "https://example.com/pricing",
                "https://example.com/search?q=a&b",
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_sitemap_is_fatal() {
        let resolver = resolver_with(MockFetcher::new());

        let err = resolver
            .resolve("https://example.com/sitemap.xml")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SitemapResolution { .. }));
    }

    #[tokio::test]
    async fn test_stalled_sitemap_fetch_is_fatal() {
        struct StallingFetcher;

        #[async_trait::async_trait]
        impl Fetcher for StallingFetcher {
            async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(FetchedPage::new(url, ""))
            }
        }

        let resolver = SitemapResolver::new(Arc::new(StallingFetcher))
            .with_fetch_timeout(Duration::from_millis(20));

        let err = resolver
            .resolve("https://example.com/sitemap.xml")
            .await
            .unwrap_err();

        match err {
            PipelineError::SitemapResolution { message, .. } => {
                assert!(message.contains("timed out"), "unexpected: {}", message);
            }
            other => panic!("expected sitemap resolution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_document_without_locs_is_fatal() {
        let resolver = resolver_with(
            MockFetcher::new().with_page("https://example.com/sitemap.xml", "<html>nope</html>"),
        );

        let err = resolver
            .resolve("https://example.com/sitemap.xml")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SitemapResolution { .. }));
    }

    #[tokio::test]
    async fn test_sitemap_index_is_followed() {
        let index = r#"<sitemapindex>
  <sitemap><loc>https://example.com/a.xml</loc></sitemap>
  <sitemap><loc>https://example.com/b.xml</loc></sitemap>
</sitemapindex>"#;
        let child_a = "<urlset><url><loc>https://example.com/1</loc></url></urlset>";
        let child_b = "<urlset><url><loc>https://example.com/2</loc></url></urlset>";

        let resolver = resolver_with(
            MockFetcher::new()
                .with_page("https://example.com/sitemap.xml", index)
                .with_page("https://example.com/a.xml", child_a)
                .with_page("https://example.com/b.xml", child_b),
        );

        let urls = resolver
            .resolve("https://example.com/sitemap.xml")
            .await
            .unwrap();

        assert_eq!(urls, vec!["https://example.com/1", "https://example.com/2"]);
    }
}
