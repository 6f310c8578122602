//! Request rate limiting
//!
//! A windowed counter for the embedding API layer. Explicitly constructed
//! and owned by whoever handles requests; there is no ambient global store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Window length and request budget per identifier
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

/// Remaining budget for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub reset_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Per-identifier request counter with fixed windows
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: HashMap<String, WindowEntry>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Record one request. Returns true when the identifier has exhausted
    /// its budget for the current window.
    pub fn is_limited(&mut self, identifier: &str) -> bool {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.reset_at > now);

        match self.entries.get_mut(identifier) {
            Some(entry) => {
                entry.count += 1;
                entry.count > self.config.max_requests
            }
            None => {
                self.entries.insert(
                    identifier.to_string(),
                    WindowEntry {
                        count: 1,
                        reset_at: now + self.config.window,
                    },
                );
                false
            }
        }
    }

    /// Remaining budget without consuming a request
    pub fn info(&self, identifier: &str) -> RateLimitInfo {
        let now = Instant::now();
        match self.entries.get(identifier) {
            Some(entry) if entry.reset_at > now => RateLimitInfo {
                remaining: self.config.max_requests.saturating_sub(entry.count),
                reset_at: entry.reset_at,
            },
            _ => RateLimitInfo {
                remaining: self.config.max_requests,
                reset_at: now + self.config.window,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window,
            max_requests,
        })
    }

    #[test]
    fn test_allows_up_to_budget_then_limits() {
        let mut limiter = limiter(3, Duration::from_secs(60));

        assert!(!limiter.is_limited("client-a"));
        assert!(!limiter.is_limited("client-a"));
        assert!(!limiter.is_limited("client-a"));
        assert!(limiter.is_limited("client-a"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut limiter = limiter(1, Duration::from_secs(60));

        assert!(!limiter.is_limited("client-a"));
        assert!(limiter.is_limited("client-a"));
        assert!(!limiter.is_limited("client-b"));
    }

    #[test]
    fn test_window_expiry_resets_budget() {
        let mut limiter = limiter(1, Duration::from_millis(10));

        assert!(!limiter.is_limited("client-a"));
        assert!(limiter.is_limited("client-a"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!limiter.is_limited("client-a"));
    }

    #[test]
    fn test_info_reports_remaining() {
        let mut limiter = limiter(5, Duration::from_secs(60));
        assert_eq!(limiter.info("client-a").remaining, 5);

        limiter.is_limited("client-a");
        limiter.is_limited("client-a");
        assert_eq!(limiter.info("client-a").remaining, 3);
    }
}
