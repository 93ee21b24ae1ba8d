use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use crate::clock::Clock;

// Rate limit entry - request timestamps per identifier, oldest first
#[derive(Default)]
pub struct RateLimitEntry {
    pub requests: VecDeque<DateTime<Utc>>,
}

impl RateLimitEntry {
    // drop everything that has left the trailing window
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(oldest) = self.requests.front() {
            if now - *oldest < window {
                break;
            }
            self.requests.pop_front();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<u64>, // whole seconds, only when rejected
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAge {
    pub timestamp: DateTime<Utc>,
    pub age: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub identifier: String,
    pub current_requests: u32,
    pub max_requests: u32,
    pub remaining: u32,
    pub window_ms: i64,
    pub reset_time: DateTime<Utc>,
    pub requests: Vec<RequestAge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierUsage {
    pub identifier: String,
    pub requests: u32,
    pub remaining: u32,
}

/// Sliding-window limiter: at most `max_requests` per trailing `window`,
/// tracked independently for every identifier.
pub struct SlidingWindowLimiter {
    records: DashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            max_requests,
            window: Duration::from_std(window).unwrap_or(Duration::seconds(60)),
            clock,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> i64 {
        self.window.num_milliseconds()
    }

    /// Admit or reject one request for `identifier`, recording it when admitted.
    ///
    /// The entry guard is held for the whole prune/compare/record sequence,
    /// so two callers with the same identifier cannot both take the last slot.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut entry = self.records.entry(identifier.to_string()).or_default();
        entry.prune(now, self.window);

        let count = entry.requests.len() as u32;
        if count >= self.max_requests {
            let oldest = entry.requests.front().copied().unwrap_or(now);
            let reset_time = oldest + self.window;
            let wait_ms = (reset_time - now).num_milliseconds().max(0);

            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(((wait_ms + 999) / 1000) as u64),
                reset_time,
            };
        }

        entry.requests.push_back(now);
        let oldest = entry.requests.front().copied().unwrap_or(now);

        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - (count + 1),
            retry_after: None,
            reset_time: oldest + self.window,
        }
    }

    // Read-only view for one identifier, nothing is recorded
    pub fn status(&self, identifier: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let requests: Vec<DateTime<Utc>> = match self.records.get_mut(identifier) {
            Some(mut entry) => {
                entry.prune(now, self.window);
                entry.requests.iter().copied().collect()
            }
            None => Vec::new(),
        };

        let current = requests.len() as u32;
        let reset_time = requests
            .first()
            .map(|oldest| *oldest + self.window)
            .unwrap_or(now + self.window);

        RateLimitStatus {
            identifier: identifier.to_string(),
            current_requests: current,
            max_requests: self.max_requests,
            remaining: self.max_requests.saturating_sub(current),
            window_ms: self.window_ms(),
            reset_time,
            requests: requests
                .into_iter()
                .map(|timestamp| RequestAge {
                    timestamp,
                    age: format!(
                        "{:.1}s ago",
                        (now - timestamp).num_milliseconds() as f64 / 1000.0
                    ),
                })
                .collect(),
        }
    }

    pub fn reset(&self, identifier: &str) -> bool {
        self.records.remove(identifier).is_some()
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.records.len()
    }

    pub fn stats(&self) -> Vec<IdentifierUsage> {
        let now = self.clock.now();
        let mut usage: Vec<IdentifierUsage> = self
            .records
            .iter()
            .map(|entry| {
                let requests = entry
                    .requests
                    .iter()
                    .filter(|t| now - **t < self.window)
                    .count() as u32;
                IdentifierUsage {
                    identifier: entry.key().clone(),
                    requests,
                    remaining: self.max_requests.saturating_sub(requests),
                }
            })
            .collect();
        usage.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max: u32, window_secs: u64) -> (SlidingWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = SlidingWindowLimiter::new(
            max,
            std::time::Duration::from_secs(window_secs),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn rejects_request_over_the_limit() {
        let (limiter, clock) = limiter(3, 60);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("alice");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            clock.advance(Duration::seconds(1));
        }

        let rejected = limiter.check("alice");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        // oldest request was 3s ago, so it leaves the window in 57s
        assert_eq!(rejected.retry_after, Some(57));
    }

    #[test]
    fn admits_again_once_oldest_leaves_window() {
        let (limiter, clock) = limiter(2, 10);

        assert!(limiter.check("bob").allowed);
        clock.advance(Duration::seconds(4));
        assert!(limiter.check("bob").allowed);
        assert!(!limiter.check("bob").allowed);

        clock.advance(Duration::seconds(6));
        let decision = limiter.check("bob");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn identifiers_are_independent() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let (limiter, _clock) = limiter(1, 60);

        limiter.check("a");
        limiter.check("a");
        limiter.check("a");

        assert_eq!(limiter.status("a").current_requests, 1);
    }

    #[test]
    fn status_does_not_consume_quota() {
        let (limiter, clock) = limiter(5, 60);
        limiter.check("carol");
        clock.advance(Duration::milliseconds(1500));

        let status = limiter.status("carol");
        assert_eq!(status.current_requests, 1);
        assert_eq!(status.remaining, 4);
        assert_eq!(status.requests[0].age, "1.5s ago");

        assert_eq!(limiter.status("carol").current_requests, 1);
        assert_eq!(limiter.status("nobody").current_requests, 0);
    }

    #[test]
    fn reset_clears_identifier() {
        let (limiter, _clock) = limiter(1, 60);
        limiter.check("dave");
        assert!(!limiter.check("dave").allowed);

        assert!(limiter.reset("dave"));
        assert!(limiter.check("dave").allowed);
        assert!(!limiter.reset("unknown"));
    }

    #[test]
    fn stats_only_count_requests_inside_window() {
        let (limiter, clock) = limiter(10, 10);
        limiter.check("x");
        clock.advance(Duration::seconds(11));
        limiter.check("y");

        let stats = limiter.stats();
        assert_eq!(limiter.tracked_identifiers(), 2);
        assert_eq!(stats[0].identifier, "x");
        assert_eq!(stats[0].requests, 0);
        assert_eq!(stats[1].requests, 1);
        assert_eq!(stats[1].remaining, 9);
    }
}
