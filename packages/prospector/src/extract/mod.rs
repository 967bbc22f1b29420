//! Content extraction - structured contact and company signals from
//! fetched HTML.
//!
//! Parsing is regex-based over the raw document plus a tag-stripped
//! text body; the keyword gate runs before any extraction so filtered
//! pages cost nothing beyond the fetch.

pub mod signals;

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::types::options::JobOptions;

pub use signals::{detect_signals, heuristic_score, signal_tags, Signal};

/// Minimum digit count for a phone candidate.
const MIN_PHONE_DIGITS: usize = 7;

/// Structured signals extracted from one page.
///
/// Social links follow a first-match policy: the first anchor in
/// document order whose href contains the network's domain wins.
#[derive(Debug, Clone, Default)]
pub struct ScrapedData {
    pub title: Option<String>,
    pub meta_description: Option<String>,

    /// Open Graph site name, falling back to the page title
    pub company_name: Option<String>,

    /// Lowercased, deduplicated, in first-seen order
    pub emails: Vec<String>,
    pub phones: Vec<String>,

    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,

    /// Heuristic signals, always computed as the fallback basis
    pub signals: Vec<Signal>,

    /// Heuristic intent score in [0, 100]
    pub heuristic_score: u8,

    /// Whitespace-normalized visible text, for qualification excerpts
    pub clean_text: String,
}

struct Patterns {
    title: Regex,
    meta_description: Regex,
    og_site_name: Regex,
    script: Regex,
    style: Regex,
    tag: Regex,
    whitespace: Regex,
    email: Regex,
    mailto: Regex,
    phone: Regex,
    tel: Regex,
    anchor: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap(),
        meta_description: Regex::new(
            r#"(?is)<meta[^>]+name\s*=\s*["']description["'][^>]*content\s*=\s*["']([^"']*)["']"#,
        )
        .unwrap(),
        og_site_name: Regex::new(
            r#"(?is)<meta[^>]+property\s*=\s*["']og:site_name["'][^>]*content\s*=\s*["']([^"']*)["']"#,
        )
        .unwrap(),
        script: Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap(),
        style: Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap(),
        tag: Regex::new(r"<[^>]+>").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
        email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        mailto: Regex::new(r#"(?i)href\s*=\s*["']mailto:([^"'?]+)"#).unwrap(),
        phone: Regex::new(r"\+?[\d][\d\s().\-]{5,}\d").unwrap(),
        tel: Regex::new(r#"(?i)href\s*=\s*["']tel:([^"']+)["']"#).unwrap(),
        anchor: Regex::new(r#"(?is)<a[^>]+href\s*=\s*["']([^"']+)["']"#).unwrap(),
    })
}

/// Extracts structured signals from fetched HTML.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract signals from a page.
    ///
    /// Returns `None` when the options carry a keyword filter and the
    /// page body matches none of the keywords (case-insensitive).
    pub fn extract(&self, html: &str, url: &str, options: &JobOptions) -> Option<ScrapedData> {
        let p = patterns();

        let clean_text = self.visible_text(html);
        let body_lower = clean_text.to_lowercase();

        // Keyword gate runs before any extraction work
        if !options.keywords.is_empty() {
            let hit = options
                .keywords
                .iter()
                .any(|kw| body_lower.contains(&kw.to_lowercase()));
            if !hit {
                tracing::debug!(url = %url, "page skipped by keyword filter");
                return None;
            }
        }

        let title = p
            .title
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty());

        let meta_description = p
            .meta_description
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|d| !d.is_empty());

        let company_name = p
            .og_site_name
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|c| !c.is_empty())
            .or_else(|| title.clone());

        let emails = if options.extract_emails {
            self.extract_emails(html, &clean_text)
        } else {
            Vec::new()
        };

        let phones = if options.extract_phones {
            self.extract_phones(html, &clean_text)
        } else {
            Vec::new()
        };

        let (linkedin_url, twitter_url, facebook_url) = if options.extract_social {
            self.extract_social_links(html)
        } else {
            (None, None, None)
        };

        let signals = detect_signals(&body_lower);
        let heuristic_score = heuristic_score(&signals);

        Some(ScrapedData {
            title,
            meta_description,
            company_name,
            emails,
            phones,
            linkedin_url,
            twitter_url,
            facebook_url,
            signals,
            heuristic_score,
            clean_text,
        })
    }

    /// Tag-stripped, entity-decoded, whitespace-normalized body text.
    fn visible_text(&self, html: &str) -> String {
        let p = patterns();
        let text = p.script.replace_all(html, " ");
        let text = p.style.replace_all(&text, " ");
        let text = p.tag.replace_all(&text, " ");
        let text = decode_entities(&text);
        p.whitespace.replace_all(&text, " ").trim().to_string()
    }

    /// Union of body-text regex matches and mailto: targets,
    /// lowercased and deduplicated.
    fn extract_emails(&self, html: &str, body: &str) -> Vec<String> {
        let p = patterns();
        let mut seen = BTreeSet::new();
        let mut emails = Vec::new();

        let mut push = |email: String| {
            if seen.insert(email.clone()) {
                emails.push(email);
            }
        };

        for m in p.email.find_iter(body) {
            push(m.as_str().to_lowercase());
        }
        for cap in p.mailto.captures_iter(html) {
            if let Some(m) = cap.get(1) {
                let email = m.as_str().trim().to_lowercase();
                if p.email.is_match(&email) {
                    push(email);
                }
            }
        }

        emails
    }

    /// Union of number-like body sequences (>= 7 digits) and tel: targets.
    fn extract_phones(&self, html: &str, body: &str) -> Vec<String> {
        let p = patterns();
        let mut seen = BTreeSet::new();
        let mut phones = Vec::new();

        let mut push = |phone: String| {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= MIN_PHONE_DIGITS && seen.insert(phone.clone()) {
                phones.push(phone);
            }
        };

        for m in p.phone.find_iter(body) {
            push(m.as_str().trim().to_string());
        }
        for cap in p.tel.captures_iter(html) {
            if let Some(m) = cap.get(1) {
                push(m.as_str().trim().to_string());
            }
        }

        phones
    }

    /// First matching anchor per network, in document order.
    fn extract_social_links(&self, html: &str) -> (Option<String>, Option<String>, Option<String>) {
        let p = patterns();
        let mut linkedin = None;
        let mut twitter = None;
        let mut facebook = None;

        for cap in p.anchor.captures_iter(html) {
            let href = match cap.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let lower = href.to_lowercase();

            if linkedin.is_none() && lower.contains("linkedin.com") {
                linkedin = Some(href.to_string());
            } else if twitter.is_none()
                && (lower.contains("twitter.com") || lower.contains("x.com"))
            {
                twitter = Some(href.to_string());
            } else if facebook.is_none() && lower.contains("facebook.com") {
                facebook = Some(href.to_string());
            }

            if linkedin.is_some() && twitter.is_some() && facebook.is_some() {
                break;
            }
        }

        (linkedin, twitter, facebook)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
