//! Heuristic buying/growth signal detection and scoring.
//!
//! The fallback basis for every lead: always computed, replaced only
//! when provider qualification succeeds.

use serde::{Deserialize, Serialize};

/// A detected buying/growth indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Hiring,
    RecentFunding,
    GrowingCompany,
    HighBuyingIntent,
}

impl Signal {
    /// The tag string persisted on leads.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Signal::Hiring => "hiring",
            Signal::RecentFunding => "recent_funding",
            Signal::GrowingCompany => "growing_company",
            Signal::HighBuyingIntent => "high_buying_intent",
        }
    }

    /// Score contribution on top of the base score.
    fn weight(&self) -> u16 {
        match self {
            Signal::HighBuyingIntent => 40,
            Signal::Hiring => 15,
            Signal::RecentFunding => 15,
            Signal::GrowingCompany => 10,
        }
    }

    /// Keyword family that marks this signal in page text.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Signal::Hiring => &["hiring", "careers", "jobs", "join our team", "open positions"],
            Signal::RecentFunding => &[
                "funding",
                "series a",
                "series b",
                "raised",
                "investors",
                "capital",
            ],
            Signal::GrowingCompany => &["expanded", "new office", "growing", "scaling"],
            Signal::HighBuyingIntent => &["contact sales", "demo", "pricing", "get started"],
        }
    }

    const ALL: [Signal; 4] = [
        Signal::Hiring,
        Signal::RecentFunding,
        Signal::GrowingCompany,
        Signal::HighBuyingIntent,
    ];
}

/// Base score before signal contributions.
const BASE_SCORE: u16 = 20;

/// Scan lowercase body text for signal keyword families.
pub fn detect_signals(body_lower: &str) -> Vec<Signal> {
    Signal::ALL
        .into_iter()
        .filter(|signal| signal.keywords().iter().any(|kw| body_lower.contains(kw)))
        .collect()
}

/// Heuristic intent score: base 20 plus signal weights, clamped to 100.
pub fn heuristic_score(signals: &[Signal]) -> u8 {
    let total = BASE_SCORE + signals.iter().map(Signal::weight).sum::<u16>();
    total.min(100) as u8
}

/// Signal tags as persisted strings.
pub fn signal_tags(signals: &[Signal]) -> Vec<String> {
    signals.iter().map(|s| s.as_tag().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_keyword_families() {
        let body = "we are hiring! see our pricing page. recently raised a series a.";
        let signals = detect_signals(body);

        assert!(signals.contains(&Signal::Hiring));
        assert!(signals.contains(&Signal::RecentFunding));
        assert!(signals.contains(&Signal::HighBuyingIntent));
        assert!(!signals.contains(&Signal::GrowingCompany));
    }

    #[test]
    fn test_no_signals_scores_base() {
        assert_eq!(heuristic_score(&[]), 20);
    }

    #[test]
    fn test_pricing_plus_hiring_scores_75() {
        // base 20 + buying intent 40 + hiring 15
        let signals = detect_signals("check our pricing. we are hiring engineers.");
        assert_eq!(heuristic_score(&signals), 75);
    }

    #[test]
    fn test_all_signals_clamp_to_100() {
        let signals = Signal::ALL.to_vec();
        // 20 + 40 + 15 + 15 + 10 = 100, exactly at the cap
        assert_eq!(heuristic_score(&signals), 100);
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(Signal::RecentFunding.as_tag(), "recent_funding");
        assert_eq!(Signal::HighBuyingIntent.as_tag(), "high_buying_intent");
    }
}
