//! Integration tests for the full job pipeline.
//!
//! These tests drive the orchestrator end to end:
//! 1. Create a job (validation, rate limiting, credit reservation)
//! 2. Run it (robots, fetch, extract, score, qualify)
//! 3. Verify counters, leads, and credit reconciliation

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use prospector::{
    testing::{MockFetcher, MockQualifier},
    ExportFormat, JobOrchestrator, JobOptions, JobRequest, JobStatus, LeadFilter, LeadStatus,
    LedgerError, MemoryStore, PipelineError, Qualification, RateLimitConfig, UserId,
};

/// A page carrying pricing (buying intent) and hiring signals:
/// heuristic score 20 + 40 + 15 = 75, hot.
const HOT_PAGE: &str = r#"<html>
<head>
  <title>Acme Widgets</title>
  <meta property="og:site_name" content="Acme Widgets">
</head>
<body>
  <p>Check our pricing. We are hiring engineers.</p>
  <p>Contact us at sales@acme.example or +1 (555) 123-4567.</p>
  <a href="https://linkedin.com/company/acme">LinkedIn</a>
</body>
</html>"#;

/// A plain page with no buying/growth signals.
const QUIET_PAGE: &str =
    "<html><head><title>Quiet Co</title></head><body>Just a brochure.</body></html>";

fn store_with_credits(user: &UserId, credits: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.open_account(user.clone(), credits);
    store
}

async fn balance_of(store: &MemoryStore, user: &UserId) -> i64 {
    use prospector::CreditStore;
    store.get_balance(user).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn test_single_url_job_end_to_end() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://acme.example/about", HOT_PAGE));

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::single(user.clone(), "https://acme.example/about");

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_urls, 1);
    assert_eq!(job.processed_urls, 1);
    assert_eq!(job.successful_urls, 1);
    assert_eq!(job.failed_urls, 0);
    assert_eq!(job.leads_found, 1);
    assert_eq!(job.credits_estimated, 1);
    assert_eq!(job.credits_used, 1);

    let leads = orchestrator
        .export(&user, &LeadFilter::for_job(job.id), ExportFormat::Json)
        .await
        .unwrap();
    let leads: Vec<serde_json::Value> = serde_json::from_slice(&leads).unwrap();
    assert_eq!(leads.len(), 1);

    let lead = &leads[0];
    assert_eq!(lead["score"], 75);
    assert_eq!(lead["status"], "hot");
    assert_eq!(lead["email"], "sales@acme.example");
    assert_eq!(lead["company"], "Acme Widgets");
    assert_eq!(lead["linkedin_url"], "https://linkedin.com/company/acme");
    assert_eq!(lead["source_url"], "https://acme.example/about");

    // 1 credit estimated, 1 used, nothing refunded
    assert_eq!(balance_of(&store, &user).await, 9);
}

#[tokio::test]
async fn test_bulk_job_with_partial_failures() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 20);

    let mut fetcher = MockFetcher::new();
    let mut urls = Vec::new();
    for i in 0..7 {
        let url = format!("https://ok.example/{}", i);
        fetcher = fetcher.with_page(&url, HOT_PAGE);
        urls.push(url);
    }
    for i in 0..3 {
        let url = format!("https://down.example/{}", i);
        fetcher = fetcher.with_failure(&url, "connection refused");
        urls.push(url);
    }

    let orchestrator = JobOrchestrator::new(store.clone(), Arc::new(fetcher));
    let job = orchestrator
        .submit(JobRequest::bulk(user.clone(), urls), CancellationToken::new())
        .await
        .unwrap();

    // Per-URL failures never fail the job
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_urls, 10);
    assert_eq!(job.successful_urls, 7);
    assert_eq!(job.failed_urls, 3);
    assert_eq!(job.leads_found, 7);

    // 10 reserved, 7 consumed, 3 refunded
    assert_eq!(job.credits_estimated, 10);
    assert_eq!(job.credits_used, 7);
    assert_eq!(balance_of(&store, &user).await, 13);
}

#[tokio::test]
async fn test_unreachable_sitemap_is_fatal_before_any_debit() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new());

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::sitemap(user.clone(), "https://dead.example/sitemap.xml");

    let err = orchestrator.create_job(request).await.unwrap_err();
    assert!(matches!(err, PipelineError::SitemapResolution { .. }));

    // No job row, no debit
    assert_eq!(store.job_count(), 0);
    assert_eq!(balance_of(&store, &user).await, 10);
}

#[tokio::test]
async fn test_sitemap_job_discovers_urls() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);

    let sitemap = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://acme.example/a</loc></url>
  <url><loc>https://acme.example/b</loc></url>
</urlset>"#;

    let fetcher = Arc::new(
        MockFetcher::new()
            .with_page("https://acme.example/sitemap.xml", sitemap)
            .with_page("https://acme.example/a", HOT_PAGE)
            .with_page("https://acme.example/b", QUIET_PAGE),
    );

    let orchestrator = JobOrchestrator::new(store, fetcher);
    let request = JobRequest::sitemap(user, "https://acme.example/sitemap.xml");

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_urls, 2);
    assert_eq!(job.successful_urls, 2);
    assert_eq!(job.leads_found, 2);
}

#[tokio::test]
async fn test_keyword_mismatch_counts_processed_not_lead() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://quiet.example", QUIET_PAGE));

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::single(user.clone(), "https://quiet.example")
        .with_options(JobOptions::default().with_keywords(["saas"]));

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    // Filtered out, but processed without error
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_urls, 1);
    assert_eq!(job.successful_urls, 1);
    assert_eq!(job.failed_urls, 0);
    assert_eq!(job.leads_found, 0);
    assert_eq!(store.lead_count(), 0);
}

#[tokio::test]
async fn test_qualifier_overrides_heuristic_result() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://acme.example", HOT_PAGE));

    let qualifier = Arc::new(MockQualifier::returning(Qualification {
        score: 92,
        signals: vec!["enterprise".to_string()],
        notes: Some("strong ICP fit".to_string()),
        industry: Some("manufacturing".to_string()),
        summary: None,
    }));

    let orchestrator =
        JobOrchestrator::new(store.clone(), fetcher).with_qualifier(qualifier.clone());
    let request = JobRequest::single(user.clone(), "https://acme.example")
        .with_options(JobOptions::default().with_qualification());

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    // Qualification doubles the per-URL cost
    assert_eq!(job.credits_estimated, 2);
    assert_eq!(job.credits_used, 2);
    assert_eq!(qualifier.calls(), vec!["https://acme.example"]);

    use prospector::LeadStore;
    let leads = store.leads_for_job(job.id).await.unwrap();
    assert_eq!(leads.len(), 1);

    // Full override of the heuristic score/signals/notes
    assert_eq!(leads[0].score, 92);
    assert_eq!(leads[0].status, LeadStatus::Hot);
    assert_eq!(leads[0].signals, vec!["enterprise"]);
    assert_eq!(leads[0].notes.as_deref(), Some("strong ICP fit"));
    assert_eq!(leads[0].industry.as_deref(), Some("manufacturing"));
}

#[tokio::test]
async fn test_qualifier_failure_falls_back_to_heuristic() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://acme.example", HOT_PAGE));

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher)
        .with_qualifier(Arc::new(MockQualifier::failing()));
    let request = JobRequest::single(user.clone(), "https://acme.example")
        .with_options(JobOptions::default().with_qualification());

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    // Qualification failure never fails the URL
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.leads_found, 1);

    use prospector::LeadStore;
    let leads = store.leads_for_job(job.id).await.unwrap();
    assert_eq!(leads[0].score, 75);
    assert!(leads[0].signals.contains(&"hiring".to_string()));
    assert!(leads[0].signals.contains(&"high_buying_intent".to_string()));
}

#[tokio::test]
async fn test_cancellation_refunds_unprocessed_urls() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_page("https://acme.example/a", HOT_PAGE)
            .with_page("https://acme.example/b", HOT_PAGE)
            .with_page("https://acme.example/c", HOT_PAGE),
    );

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::bulk(
        user.clone(),
        [
            "https://acme.example/a",
            "https://acme.example/b",
            "https://acme.example/c",
        ],
    );

    let prepared = orchestrator.create_job(request).await.unwrap();
    assert_eq!(balance_of(&store, &user).await, 7);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let job = orchestrator.run_job(prepared, cancel).await.unwrap();

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.processed_urls, 0);
    assert_eq!(job.credits_used, 0);

    // Everything reserved comes back
    assert_eq!(balance_of(&store, &user).await, 10);
}

#[tokio::test]
async fn test_robots_disallow_counts_as_url_failure() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_page("https://blocked.example/robots.txt", "User-agent: *\nDisallow: /")
            .with_page("https://blocked.example/page", HOT_PAGE),
    );

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::single(user.clone(), "https://blocked.example/page");

    let job = orchestrator
        .submit(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_urls, 1);
    assert_eq!(job.leads_found, 0);

    // The blocked fetch consumed nothing
    assert_eq!(job.credits_used, 0);
    assert_eq!(balance_of(&store, &user).await, 10);
}

#[tokio::test]
async fn test_insufficient_credits_rejects_job() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 1);
    let fetcher = Arc::new(MockFetcher::new());

    let orchestrator = JobOrchestrator::new(store.clone(), fetcher);
    let request = JobRequest::bulk(
        user,
        ["https://a.example", "https://b.example", "https://c.example"],
    );

    let err = orchestrator.create_job(request).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ledger(LedgerError::InsufficientCredits {
            required: 3,
            available: 1
        })
    ));
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn test_csv_export_round_trip() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://acme.example", HOT_PAGE));

    let orchestrator = JobOrchestrator::new(store, fetcher);
    let job = orchestrator
        .submit(
            JobRequest::single(user.clone(), "https://acme.example"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let csv = orchestrator
        .export(&user, &LeadFilter::for_job(job.id), ExportFormat::Csv)
        .await
        .unwrap();
    let csv = String::from_utf8(csv).unwrap();

    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("email,phone,full_name"));

    let row = lines.next().unwrap();
    assert!(row.contains("sales@acme.example"));
    assert!(row.contains(",75,hot,"));
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn test_export_quota_is_enforced() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let orchestrator = JobOrchestrator::new(store, Arc::new(MockFetcher::new())).with_limits(
        RateLimitConfig::scraping(),
        RateLimitConfig::new(2, Duration::from_secs(60)),
    );

    let filter = LeadFilter::for_user(user.clone());
    for _ in 0..2 {
        orchestrator
            .export(&user, &filter, ExportFormat::Json)
            .await
            .unwrap();
    }

    let err = orchestrator
        .export(&user, &filter, ExportFormat::Json)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RateLimited { .. }));
}

#[tokio::test]
async fn test_progress_is_observable_after_completion() {
    let user = UserId::from("user-1");
    let store = store_with_credits(&user, 10);
    let fetcher = Arc::new(MockFetcher::new().with_page("https://acme.example", HOT_PAGE));

    let orchestrator = JobOrchestrator::new(store, fetcher);
    let job = orchestrator
        .submit(
            JobRequest::single(user, "https://acme.example"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let progress = orchestrator.job_progress(job.id).await.unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.processed_urls, 1);
    assert_eq!(progress.leads_found, 1);

    let missing = orchestrator
        .job_progress(prospector::JobId::new())
        .await
        .unwrap_err();
    assert!(matches!(missing, PipelineError::JobNotFound { .. }));
}
