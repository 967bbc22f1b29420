//! Job options - the typed configuration bag validated at job creation.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Upper bound on crawl depth accepted at validation time.
const MAX_DEPTH: u32 = 5;

/// Upper bound on keyword filter size.
const MAX_KEYWORDS: usize = 25;

/// Extraction and qualification options for a job.
///
/// Every field has a documented default; unknown-but-required
/// combinations are rejected by [`JobOptions::validate`] at job
/// creation rather than at use time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Extract email addresses. Default: true.
    pub extract_emails: bool,

    /// Extract phone numbers. Default: true.
    pub extract_phones: bool,

    /// Extract social profile links. Default: true.
    pub extract_social: bool,

    /// Attempt provider-based qualification; falls back to the
    /// heuristic scorer on any failure. Default: false.
    pub qualify_leads: bool,

    /// Case-insensitive keyword gate: pages matching none of these are
    /// skipped before extraction. Empty = no gate. Default: empty.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Crawl depth for link expansion; 0 means fetch only the given
    /// URLs. Default: 0.
    #[serde(default)]
    pub max_depth: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            extract_emails: true,
            extract_phones: true,
            extract_social: true,
            qualify_leads: false,
            keywords: Vec::new(),
            max_depth: 0,
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qualification(mut self) -> Self {
        self.qualify_leads = true;
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = keywords.into_iter().map(|k| k.into()).collect();
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn without_emails(mut self) -> Self {
        self.extract_emails = false;
        self
    }

    pub fn without_phones(mut self) -> Self {
        self.extract_phones = false;
        self
    }

    pub fn without_social(mut self) -> Self {
        self.extract_social = false;
        self
    }

    /// Validate the option combination.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_depth > MAX_DEPTH {
            return Err(PipelineError::Validation {
                reason: format!("max_depth {} exceeds limit {}", self.max_depth, MAX_DEPTH),
            });
        }
        if self.keywords.len() > MAX_KEYWORDS {
            return Err(PipelineError::Validation {
                reason: format!(
                    "{} keywords exceeds limit {}",
                    self.keywords.len(),
                    MAX_KEYWORDS
                ),
            });
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(PipelineError::Validation {
                reason: "keywords must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = JobOptions::default();
        assert!(options.extract_emails);
        assert!(options.extract_phones);
        assert!(options.extract_social);
        assert!(!options.qualify_leads);
        assert!(options.keywords.is_empty());
        assert_eq!(options.max_depth, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let options = JobOptions::default().with_max_depth(10);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_blank_keywords() {
        let options = JobOptions::default().with_keywords(["saas", "  "]);
        assert!(options.validate().is_err());
    }
}
