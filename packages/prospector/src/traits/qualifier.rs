//! Qualifier trait - the AI qualification boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QualifyResult;

/// Provider-supplied qualification of one page.
///
/// On success these values replace the heuristic score/signals/notes
/// entirely (full override, not a blend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qualification {
    /// Lead quality score in [0, 100]
    pub score: u8,

    /// Detected signal tags
    #[serde(default)]
    pub signals: Vec<String>,

    /// Free-text analysis notes
    #[serde(default)]
    pub notes: Option<String>,

    /// Industry/category hint
    #[serde(default)]
    pub industry: Option<String>,

    /// One-line company summary
    #[serde(default)]
    pub summary: Option<String>,
}

/// External text-qualification provider.
///
/// Qualification is best-effort: callers map any `Err` to "use the
/// heuristic result already computed" and never fail the URL on it.
#[async_trait]
pub trait Qualifier: Send + Sync {
    /// Qualify a page from a bounded content excerpt and its source URL.
    async fn qualify(&self, excerpt: &str, url: &str) -> QualifyResult<Qualification>;

    /// Provider name for logging.
    fn name(&self) -> &str {
        "qualifier"
    }
}
