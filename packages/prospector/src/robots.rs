//! Robots.txt parsing and crawl-policy checking.
//!
//! The checker fetches `{origin}/robots.txt` through the injected
//! [`Fetcher`] and evaluates the target URL against the pipeline's user
//! agent. Whether a failed policy fetch permits or blocks the crawl is
//! a configurable [`RobotsPolicy`] (default: fail-open, matching the
//! reference behavior).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use url::Url;

use crate::traits::fetcher::Fetcher;

/// Reason string attached to robots-disallowed URLs.
pub const ROBOTS_DISALLOW_REASON: &str = "Restricted by robots.txt policy";

/// Default bound on one robots.txt fetch. Policy lookups sit on the
/// critical path of every first-contact URL, so they get a tighter
/// budget than page fetches.
pub const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when robots.txt cannot be fetched or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotsPolicy {
    /// Absence of policy is not a block (reference behavior).
    #[default]
    FailOpen,

    /// Treat an unreadable policy as a block.
    FailClosed,
}

/// Outcome of a robots check for one URL.
#[derive(Debug, Clone)]
pub struct RobotsDecision {
    pub allowed: bool,

    /// Present when disallowed
    pub reason: Option<String>,

    /// Site-requested delay between requests, if any
    pub crawl_delay: Option<Duration>,
}

impl RobotsDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            crawl_delay: None,
        }
    }

    fn disallowed(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            crawl_delay: None,
        }
    }
}

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent (lowercase)
    rules: HashMap<String, AgentRules>,

    /// Default rules (for *)
    default_rules: AgentRules,

    /// Crawl delay in seconds
    crawl_delay: Option<f64>,

    /// Sitemaps listed
    sitemaps: Vec<String>,
}

/// Rules for a specific user-agent.
#[derive(Debug, Clone, Default)]
struct AgentRules {
    /// Disallowed path prefixes
    disallow: Vec<String>,

    /// Allowed path prefixes (override disallow)
    allow: Vec<String>,

    /// Crawl delay for this agent
    crawl_delay: Option<f64>,
}

impl RobotsTxt {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((directive, value)) = line.split_once(':') {
                let directive = directive.trim().to_lowercase();
                let value = value.trim();

                match directive.as_str() {
                    "user-agent" => {
                        // Save previous group's rules if any
                        if !current_agents.is_empty() && !group_is_open(&current_rules) {
                            for agent in current_agents.drain(..) {
                                if agent == "*" {
                                    robots.default_rules = current_rules.clone();
                                } else {
                                    robots.rules.insert(agent, current_rules.clone());
                                }
                            }
                            current_rules = AgentRules::default();
                        }

                        current_agents.push(value.to_lowercase());
                    }
                    "disallow" => {
                        if !value.is_empty() {
                            current_rules.disallow.push(value.to_string());
                        }
                    }
                    "allow" => {
                        if !value.is_empty() {
                            current_rules.allow.push(value.to_string());
                        }
                    }
                    "crawl-delay" => {
                        if let Ok(delay) = value.parse::<f64>() {
                            current_rules.crawl_delay = Some(delay);
                            if robots.crawl_delay.is_none() {
                                robots.crawl_delay = Some(delay);
                            }
                        }
                    }
                    "sitemap" => {
                        robots.sitemaps.push(value.to_string());
                    }
                    _ => {}
                }
            }
        }

        for agent in current_agents {
            if agent == "*" {
                robots.default_rules = current_rules.clone();
            } else {
                robots.rules.insert(agent, current_rules.clone());
            }
        }

        robots
    }

    /// Check if a path is allowed for a user-agent.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent_lower = user_agent.to_lowercase();

        let rules = self
            .rules
            .get(&agent_lower)
            .or_else(|| {
                // Partial match: "ProspectorBot/1.0" matches "prospectorbot"
                self.rules
                    .iter()
                    .find(|(k, _)| agent_lower.contains(k.as_str()))
                    .map(|(_, v)| v)
            })
            .unwrap_or(&self.default_rules);

        // Allow rules take precedence over disallow
        for allow in &rules.allow {
            if path.starts_with(allow) {
                return true;
            }
        }

        for disallow in &rules.disallow {
            if disallow == "/" {
                return false;
            }
            if path.starts_with(disallow) {
                return false;
            }
        }

        true
    }

    /// Get crawl delay for a user-agent.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent_lower = user_agent.to_lowercase();

        let delay = self
            .rules
            .get(&agent_lower)
            .and_then(|r| r.crawl_delay)
            .or(self.crawl_delay);

        delay.map(Duration::from_secs_f64)
    }

    /// Get listed sitemaps.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

/// Consecutive `User-agent` lines share one rule group.
fn group_is_open(rules: &AgentRules) -> bool {
    rules.allow.is_empty() && rules.disallow.is_empty() && rules.crawl_delay.is_none()
}

/// Fetches, caches, and evaluates robots policies per origin.
///
/// The checker never propagates its own failures: an unreachable or
/// broken robots.txt resolves to allow/deny per the configured
/// [`RobotsPolicy`].
pub struct RobotsChecker {
    fetcher: Arc<dyn Fetcher>,
    user_agent: String,
    policy: RobotsPolicy,
    fetch_timeout: Duration,
    cache: RwLock<HashMap<String, RobotsTxt>>,
}

impl RobotsChecker {
    pub fn new(fetcher: Arc<dyn Fetcher>, user_agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.into(),
            policy: RobotsPolicy::default(),
            fetch_timeout: ROBOTS_FETCH_TIMEOUT,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Override the fail-open default.
    pub fn with_policy(mut self, policy: RobotsPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Change the policy in place, keeping cached and preloaded rules.
    pub fn set_policy(&mut self, policy: RobotsPolicy) {
        self.policy = policy;
    }

    /// Override the per-fetch time budget.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Preload parsed rules for an origin (used in tests and warm starts).
    pub fn preload(&self, origin: impl Into<String>, robots: RobotsTxt) {
        self.cache.write().unwrap().insert(origin.into(), robots);
    }

    /// Decide whether `url` may be fetched by the pipeline's user agent.
    pub async fn check(&self, url: &str) -> RobotsDecision {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return self.policy_fallback("invalid URL"),
        };

        let origin = parsed.origin().ascii_serialization();
        let robots = self.rules_for(&origin).await;

        let robots = match robots {
            Some(r) => r,
            None => return self.policy_fallback("robots.txt unavailable"),
        };

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        if robots.is_allowed(&self.user_agent, &path) {
            RobotsDecision {
                allowed: true,
                reason: None,
                crawl_delay: robots.crawl_delay(&self.user_agent),
            }
        } else {
            RobotsDecision::disallowed(ROBOTS_DISALLOW_REASON)
        }
    }

    /// Cached rules for an origin, fetching on miss.
    async fn rules_for(&self, origin: &str) -> Option<RobotsTxt> {
        if let Some(robots) = self.cache.read().unwrap().get(origin) {
            return Some(robots.clone());
        }

        let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&robots_url)).await;
        let robots = match fetched {
            Ok(Ok(page)) => RobotsTxt::parse(&page.html),
            Ok(Err(e)) => {
                tracing::debug!(origin = %origin, error = %e, "robots.txt fetch failed");
                match self.policy {
                    // Absence of policy is not a block; cache allow-all
                    // so one broken origin doesn't refetch per URL.
                    RobotsPolicy::FailOpen => RobotsTxt::default(),
                    RobotsPolicy::FailClosed => return None,
                }
            }
            Err(_) => {
                tracing::debug!(
                    origin = %origin,
                    timeout = ?self.fetch_timeout,
                    "robots.txt fetch timed out"
                );
                match self.policy {
                    RobotsPolicy::FailOpen => RobotsTxt::default(),
                    RobotsPolicy::FailClosed => return None,
                }
            }
        };

        self.cache
            .write()
            .unwrap()
            .insert(origin.to_string(), robots.clone());
        Some(robots)
    }

    fn policy_fallback(&self, why: &str) -> RobotsDecision {
        match self.policy {
            RobotsPolicy::FailOpen => RobotsDecision::allowed(),
            RobotsPolicy::FailClosed => RobotsDecision::disallowed(format!(
                "{} ({})",
                ROBOTS_DISALLOW_REASON, why
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlResult;
    use crate::testing::MockFetcher;
    use crate::types::page::FetchedPage;

    /// A fetcher that never responds within any sane budget.
    struct StallingFetcher;

    #[async_trait::async_trait]
    impl Fetcher for StallingFetcher {
        async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(FetchedPage::new(url, ""))
        }
    }

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://example.com/sitemap.xml
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed("TestBot", "/public/page"));
        assert!(!robots.is_allowed("TestBot", "/private/page"));
        assert!(!robots.is_allowed("TestBot", "/admin/"));
        assert!(robots.is_allowed("TestBot", "/other/page"));

        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(2)));
        assert_eq!(robots.sitemaps().len(), 1);
    }

    #[test]
    fn test_specific_user_agent() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: goodbot
Disallow:
Allow: /
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("BadBot", "/page"));
        assert!(robots.is_allowed("GoodBot", "/page"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/public/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("Bot", "/private/secret"));
        assert!(robots.is_allowed("Bot", "/private/public/page"));
    }

    #[test]
    fn test_empty_robots_allows_all() {
        let robots = RobotsTxt::parse("");

        assert!(robots.is_allowed("AnyBot", "/any/path"));
        assert!(robots.crawl_delay("AnyBot").is_none());
    }

    #[tokio::test]
    async fn test_fail_open_when_robots_unreachable() {
        // MockFetcher with no registered pages errors on every fetch
        let fetcher = Arc::new(MockFetcher::new());
        let checker = RobotsChecker::new(fetcher, "ProspectorBot/1.0");

        let decision = checker.check("https://example.com/page").await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_fail_closed_when_robots_unreachable() {
        let fetcher = Arc::new(MockFetcher::new());
        let checker = RobotsChecker::new(fetcher, "ProspectorBot/1.0")
            .with_policy(RobotsPolicy::FailClosed);

        let decision = checker.check("https://example.com/page").await;
        assert!(!decision.allowed);
        assert!(decision.reason.is_some());
    }

    #[tokio::test]
    async fn test_disallowed_path_reports_reason() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/robots.txt", "User-agent: *\nDisallow: /"),
        );
        let checker = RobotsChecker::new(fetcher, "ProspectorBot/1.0");

        let decision = checker.check("https://example.com/anything").await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some(ROBOTS_DISALLOW_REASON));
    }

    #[tokio::test]
    async fn test_stalled_robots_fetch_is_bounded() {
        let open = RobotsChecker::new(Arc::new(StallingFetcher), "ProspectorBot/1.0")
            .with_fetch_timeout(Duration::from_millis(20));

        // Elapse resolves like an unreachable robots.txt
        let decision = open.check("https://example.com/page").await;
        assert!(decision.allowed);

        let closed = RobotsChecker::new(Arc::new(StallingFetcher), "ProspectorBot/1.0")
            .with_policy(RobotsPolicy::FailClosed)
            .with_fetch_timeout(Duration::from_millis(20));

        let decision = closed.check("https://example.com/page").await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_preloaded_rules_skip_fetch() {
        let fetcher = Arc::new(MockFetcher::new());
        let checker = RobotsChecker::new(fetcher.clone(), "ProspectorBot/1.0");

        checker.preload(
            "https://example.com",
            RobotsTxt::parse("User-agent: *\nDisallow: /private/"),
        );

        let blocked = checker.check("https://example.com/private/x").await;
        assert!(!blocked.allowed);

        let open = checker.check("https://example.com/public").await;
        assert!(open.allowed);

        // No network calls were made
        assert!(fetcher.calls().is_empty());
    }
}
