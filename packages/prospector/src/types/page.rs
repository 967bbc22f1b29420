//! Fetched page representation with content hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A page fetched from the network.
///
/// The content hash is stamped onto leads as provenance, so downstream
/// consumers can detect when two leads came from identical content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// Final URL after redirects
    pub final_url: String,

    /// Raw HTML body
    pub html: String,

    /// Content-Type header if present
    pub content_type: Option<String>,

    /// HTTP status code
    pub status: u16,

    /// SHA-256 hash of the body
    pub content_hash: String,

    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Create a page record, hashing the body.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let html = html.into();
        let content_hash = Self::hash_content(&html);
        Self {
            final_url: url.clone(),
            url,
            html,
            content_type: None,
            status: 200,
            content_hash,
            fetched_at: Utc::now(),
        }
    }

    /// Calculate SHA-256 hash of content.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = FetchedPage::new("https://example.com", "<html></html>");
        let b = FetchedPage::new("https://example.com/other", "<html></html>");
        assert_eq!(a.content_hash, b.content_hash);

        let c = FetchedPage::new("https://example.com", "<html>x</html>");
        assert_ne!(a.content_hash, c.content_hash);
    }
}
