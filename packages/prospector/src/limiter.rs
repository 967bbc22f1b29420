//! Per-identity fixed-window rate limiting.
//!
//! Bounds request volume per identity (user id, endpoint class) inside
//! a fixed time window. Window state lives in process memory: limits
//! are per-instance, not global, which is acceptable for
//! single-instance deployments only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Expired entries are reclaimed opportunistically on roughly one check
/// in this many, bounding cleanup cost without a background timer.
const CLEANUP_INTERVAL: u64 = 100;

/// Window length and request budget for one limiter instance.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// General authenticated traffic: 100 requests per minute.
    pub const fn general() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// Unauthenticated traffic: 20 requests per minute.
    pub const fn anonymous() -> Self {
        Self::new(20, Duration::from_secs(60))
    }

    /// Job-creation (scraping) traffic: 10 requests per minute.
    pub const fn scraping() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    /// Export traffic: 5 requests per minute.
    pub const fn export() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,

    /// Requests left in the current window (0 when refused)
    pub remaining: u32,

    /// When the current window resets
    pub reset_at: Instant,

    /// How long to wait before retrying; set only when refused
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter keyed by identity.
///
/// The first request from an identity (or the first after window
/// expiry) opens a fresh window; requests beyond `max_requests` within
/// the window are refused until it resets.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, WindowState>>,
    checks: AtomicU64,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check and count one request for an identity.
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();

        if self.checks.fetch_add(1, Ordering::Relaxed) % CLEANUP_INTERVAL == 0 {
            windows.retain(|_, state| state.reset_at > now);
        }

        let state = windows.entry(identity.to_string()).or_insert(WindowState {
            count: 0,
            reset_at: now + self.config.window,
        });

        if now >= state.reset_at {
            // Window expired: open a fresh one
            state.count = 0;
            state.reset_at = now + self.config.window;
        }

        if state.count >= self.config.max_requests {
            let retry_after = state.reset_at.saturating_duration_since(now);
            tracing::debug!(
                identity = %identity,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit exceeded"
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: state.reset_at,
                retry_after: Some(retry_after),
            };
        }

        state.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.config.max_requests - state.count,
            reset_at: state.reset_at,
            retry_after: None,
        }
    }

    /// Number of identities currently tracked (expired entries linger
    /// until opportunistic cleanup touches them).
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max_then_refuses() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig::new(5, Duration::from_secs(60)));

        for i in 0..5 {
            let decision = limiter.check("user-1");
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.remaining, 4 - i);
        }

        let sixth = limiter.check("user-1");
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert!(sixth.retry_after.is_some());
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));

        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn test_window_expiry_opens_fresh_window() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig::new(1, Duration::from_millis(20)));

        assert!(limiter.check("user").allowed);
        assert!(!limiter.check("user").allowed);

        std::thread::sleep(Duration::from_millis(30));

        let decision = limiter.check("user");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_opportunistic_cleanup_reclaims_expired() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig::new(10, Duration::from_millis(5)));

        for i in 0..50 {
            limiter.check(&format!("user-{}", i));
        }
        assert!(limiter.tracked_identities() > 0);

        std::thread::sleep(Duration::from_millis(10));

        // Drive enough checks to cross a cleanup tick
        for _ in 0..=CLEANUP_INTERVAL {
            limiter.check("sweeper");
        }

        // Only the sweeper's own window should remain
        assert_eq!(limiter.tracked_identities(), 1);
    }
}
