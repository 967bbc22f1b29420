//! In-memory test doubles for the pipeline's external seams.
//!
//! These mocks are used by the crate's own tests and are exported so
//! downstream integration tests can drive the pipeline without network
//! access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{CrawlError, CrawlResult, QualifyError, QualifyResult};
use crate::traits::fetcher::Fetcher;
use crate::traits::qualifier::{Qualification, Qualifier};
use crate::types::page::FetchedPage;

/// Scripted [`Fetcher`] serving canned pages from a URL map.
///
/// Fetching an unregistered URL fails with a [`CrawlError::Http`], so a
/// bare `MockFetcher::new()` doubles as an always-failing fetcher.
/// Every fetch attempt is recorded and retrievable via [`calls`].
///
/// [`calls`]: MockFetcher::calls
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    failures: HashMap<String, FailureKind>,
    calls: Arc<RwLock<Vec<String>>>,
}

#[derive(Clone)]
enum FailureKind {
    Http(String),
    Status(u16),
    Timeout,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page served for `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Script a generic HTTP failure for `url`.
    pub fn with_failure(mut self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures
            .insert(url.into(), FailureKind::Http(message.into()));
        self
    }

    /// Script a non-2xx status for `url`.
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.failures.insert(url.into(), FailureKind::Status(status));
        self
    }

    /// Script a timeout for `url`.
    pub fn with_timeout(mut self, url: impl Into<String>) -> Self {
        self.failures.insert(url.into(), FailureKind::Timeout);
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(kind) = self.failures.get(url) {
            return Err(match kind {
                FailureKind::Http(message) => CrawlError::Http {
                    url: url.to_string(),
                    message: message.clone(),
                },
                FailureKind::Status(status) => CrawlError::Status {
                    url: url.to_string(),
                    status: *status,
                },
                FailureKind::Timeout => CrawlError::Timeout {
                    url: url.to_string(),
                },
            });
        }

        match self.pages.get(url) {
            Some(html) => Ok(FetchedPage::new(url, html.clone())),
            None => Err(CrawlError::Http {
                url: url.to_string(),
                message: "no mock response registered".to_string(),
            }),
        }
    }
}

/// Scripted [`Qualifier`] returning a fixed outcome.
pub struct MockQualifier {
    outcome: QualifyResult<Qualification>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockQualifier {
    /// Always succeed with the given qualification.
    pub fn returning(qualification: Qualification) -> Self {
        Self {
            outcome: Ok(qualification),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Always succeed with a bare score.
    pub fn scoring(score: u8) -> Self {
        Self::returning(Qualification {
            score,
            signals: Vec::new(),
            notes: None,
            industry: None,
            summary: None,
        })
    }

    /// Always fail as if the provider returned non-JSON prose.
    pub fn failing() -> Self {
        Self {
            outcome: Err(QualifyError::MalformedResponse(
                "no JSON object in response".to_string(),
            )),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Source URLs qualified so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Qualifier for MockQualifier {
    async fn qualify(&self, _excerpt: &str, url: &str) -> QualifyResult<Qualification> {
        self.calls.write().unwrap().push(url.to_string());
        match &self.outcome {
            Ok(q) => Ok(q.clone()),
            Err(QualifyError::MalformedResponse(m)) => {
                Err(QualifyError::MalformedResponse(m.clone()))
            }
            Err(QualifyError::Provider(m)) => Err(QualifyError::Provider(m.clone())),
            Err(QualifyError::NotConfigured) => Err(QualifyError::NotConfigured),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
