//! Lead filtering and export serialization.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::store::LeadStore;
use crate::types::job::{JobId, UserId};
use crate::types::lead::{Lead, LeadStatus};

/// Filter for scoping lead queries and exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadFilter {
    pub user: Option<UserId>,
    pub job_id: Option<JobId>,
    pub status: Option<LeadStatus>,
    pub min_score: Option<u8>,

    /// Only leads whose source URL contains this fragment
    pub source_contains: Option<String>,
}

impl LeadFilter {
    /// Empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Default::default()
        }
    }

    pub fn for_job(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_source_contains(mut self, fragment: impl Into<String>) -> Self {
        self.source_contains = Some(fragment.into());
        self
    }

    /// Check if a lead matches this filter.
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(user) = &self.user {
            if &lead.user != user {
                return false;
            }
        }
        if let Some(job_id) = self.job_id {
            if lead.job_id != job_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if lead.score < min {
                return false;
            }
        }
        if let Some(fragment) = &self.source_contains {
            if !lead.source_url.contains(fragment.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Export serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

/// CSV header row for lead exports.
const CSV_HEADER: &str =
    "email,phone,full_name,job_title,company,score,status,signals,source_url,created_at";

/// Export leads matching a filter as a serialized byte stream.
pub async fn export_leads<S: LeadStore>(
    store: &S,
    filter: &LeadFilter,
    format: ExportFormat,
) -> Result<Vec<u8>> {
    let leads = store.query_leads(filter).await?;

    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(&leads)?),
        ExportFormat::Csv => Ok(leads_to_csv(&leads).into_bytes()),
    }
}

fn leads_to_csv(leads: &[Lead]) -> String {
    let mut out = String::with_capacity(leads.len() * 128 + CSV_HEADER.len());
    out.push_str(CSV_HEADER);
    out.push('\n');

    for lead in leads {
        let row = [
            csv_field(lead.email.as_deref().unwrap_or("")),
            csv_field(lead.phone.as_deref().unwrap_or("")),
            csv_field(lead.full_name.as_deref().unwrap_or("")),
            csv_field(lead.job_title.as_deref().unwrap_or("")),
            csv_field(lead.company.as_deref().unwrap_or("")),
            lead.score.to_string(),
            lead.status.as_str().to_string(),
            csv_field(&lead.signals.join(";")),
            csv_field(&lead.source_url),
            lead.created_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStore;
    use crate::types::lead::ScoreBands;

    fn lead(user: &str, job_id: JobId, score: u16, url: &str) -> Lead {
        Lead::new(job_id, UserId::from(user), url)
            .with_score(score, &ScoreBands::default())
            .with_company("Acme, Inc.")
    }

    #[test]
    fn test_filter_matches() {
        let job_id = JobId::new();
        let hot = lead("u", job_id, 80, "https://a.example");
        let cold = lead("u", job_id, 10, "https://b.example");

        let filter = LeadFilter::for_job(job_id).with_status(LeadStatus::Hot);
        assert!(filter.matches(&hot));
        assert!(!filter.matches(&cold));

        let score_filter = LeadFilter::new().with_min_score(50);
        assert!(score_filter.matches(&hot));
        assert!(!score_filter.matches(&cold));

        let source_filter = LeadFilter::new().with_source_contains("a.example");
        assert!(source_filter.matches(&hot));
        assert!(!source_filter.matches(&cold));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("has,comma"), "\"has,comma\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_export_formats_agree() {
        let store = MemoryStore::new();
        let job_id = JobId::new();
        let mut a = lead("u", job_id, 80, "https://a.example");
        a.email = Some("a@a.example".to_string());
        let mut b = lead("u", job_id, 45, "https://b.example");
        b.email = Some("b@b.example".to_string());

        use crate::traits::store::LeadStore as _;
        store.insert_lead(&a).await.unwrap();
        store.insert_lead(&b).await.unwrap();

        let filter = LeadFilter::for_job(job_id);

        let json = export_leads(&store, &filter, ExportFormat::Json)
            .await
            .unwrap();
        let parsed: Vec<Lead> = serde_json::from_slice(&json).unwrap();

        let csv = export_leads(&store, &filter, ExportFormat::Csv)
            .await
            .unwrap();
        let csv = String::from_utf8(csv).unwrap();

        // Same record set in both formats
        assert_eq!(parsed.len(), 2);
        for lead in &parsed {
            let email = lead.email.as_deref().unwrap();
            assert!(csv.contains(email));
            assert!(csv.contains(&lead.source_url));
        }

        // Company with a comma survives quoting
        assert!(csv.contains("\"Acme, Inc.\""));
        assert!(csv.starts_with("email,phone"));
    }
}
