//! Lead types - a scored contact/company record from one URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::job::{JobId, UserId};

/// Identifier for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lead temperature, derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Hot,
    Warm,
    Cold,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Hot => "hot",
            LeadStatus::Warm => "warm",
            LeadStatus::Cold => "cold",
        }
    }
}

/// Score thresholds mapping a lead score onto [`LeadStatus`].
///
/// A named, overridable policy rather than magic numbers: scores at or
/// above `hot` are Hot, at or above `warm` are Warm, everything below
/// is Cold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBands {
    pub hot: u8,
    pub warm: u8,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self { hot: 70, warm: 40 }
    }
}

impl ScoreBands {
    /// Derive the status for a score under this policy.
    pub fn status_for(&self, score: u8) -> LeadStatus {
        if score >= self.hot {
            LeadStatus::Hot
        } else if score >= self.warm {
            LeadStatus::Warm
        } else {
            LeadStatus::Cold
        }
    }
}

/// A qualified contact/company record extracted from a single URL.
///
/// Created once per successfully scraped, extraction-eligible URL and
/// never mutated afterwards by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub job_id: JobId,
    pub user: UserId,

    // Contact fields
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub job_title: Option<String>,

    // Company fields
    pub company: Option<String>,

    // Social profiles
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,

    /// Lead quality score, always in [0, 100]
    pub score: u8,

    /// Derived from `score` via the active [`ScoreBands`]
    pub status: LeadStatus,

    /// Free-text qualification notes (heuristic or provider-supplied)
    pub notes: Option<String>,

    /// Detected buying/growth signal tags
    pub signals: Vec<String>,

    /// The URL that produced this record; always present
    pub source_url: String,

    /// Industry/category hints
    pub industry: Option<String>,
    pub tags: Vec<String>,

    /// SHA-256 hash of the page content this lead came from
    pub content_hash: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Create a minimal lead for a source URL; score defaults to 0/Cold.
    pub fn new(job_id: JobId, user: UserId, source_url: impl Into<String>) -> Self {
        Self {
            id: LeadId::new(),
            job_id,
            user,
            email: None,
            phone: None,
            full_name: None,
            job_title: None,
            company: None,
            linkedin_url: None,
            twitter_url: None,
            facebook_url: None,
            score: 0,
            status: LeadStatus::Cold,
            notes: None,
            signals: Vec::new(),
            source_url: source_url.into(),
            industry: None,
            tags: Vec::new(),
            content_hash: None,
            created_at: Utc::now(),
        }
    }

    /// Set score and derive status under the given bands, clamping to [0, 100].
    pub fn with_score(mut self, score: u16, bands: &ScoreBands) -> Self {
        self.score = score.min(100) as u8;
        self.status = bands.status_for(self.score);
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_signals(mut self, signals: Vec<String>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
