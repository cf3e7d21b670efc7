use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

pub const DEFAULT_WINDOW_SECONDS: u64 = 60;
pub const DEFAULT_LIMIT: u64 = 120;

/// Counters keyed by (subject, window index).
///
/// `increment` must be a single atomic increment-and-read so that concurrent
/// requests for the same subject never undercount.
pub trait CounterStore: Send + Sync {
    fn increment(&self, subject: &str, window: i64) -> u64;
}

/// Process-local counter store. Windows older than the current one are
/// dropped the first time a newer window is seen.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<(String, i64), u64>,
    newest_window: AtomicI64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, subject: &str, window: i64) -> u64 {
        if self.newest_window.fetch_max(window, Ordering::AcqRel) < window {
            self.counters.retain(|(_, w), _| *w >= window);
        }

        let mut count = self.counters.entry((subject.to_string(), window)).or_insert(0);
        *count += 1;
        *count
    }
}

/// Verdict for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub count: u64,
    pub limit: u64,
    /// Seconds until the current window rolls over
    pub retry_after_secs: u64,
}

/// Fixed-window counter: every request in a window counts, rejected ones included.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
    window_seconds: u64,
    limit: u64,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, window_seconds: u64, limit: u64) -> Self {
        Self { store, window_seconds: window_seconds.max(1), limit }
    }

    pub fn in_memory(window_seconds: u64, limit: u64) -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), window_seconds, limit)
    }

    pub fn check(&self, subject: &str, now: DateTime<Utc>) -> RateDecision {
        let window_seconds = self.window_seconds as i64;
        let now_secs = now.timestamp();
        let window = now_secs.div_euclid(window_seconds);

        let count = self.store.increment(subject, window);
        let retry_after_secs = ((window + 1) * window_seconds - now_secs).max(1) as u64;

        RateDecision {
            allowed: count <= self.limit,
            count,
            limit: self.limit,
            retry_after_secs,
        }
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::in_memory(DEFAULT_WINDOW_SECONDS, DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_121st_request_rejected_until_next_window() {
        let limiter = FixedWindowLimiter::default();
        let start = at(1_700_000_040); // window-aligned

        for i in 1..=120 {
            let decision = limiter.check("proj", start + chrono::Duration::seconds(i % 60));
            assert!(decision.allowed, "request {i} should pass");
        }

        let rejected = limiter.check("proj", start + chrono::Duration::seconds(59));
        assert!(!rejected.allowed);
        assert_eq!(rejected.count, 121);
        assert_eq!(rejected.retry_after_secs, 1);

        let next = limiter.check("proj", start + chrono::Duration::seconds(60));
        assert!(next.allowed);
        assert_eq!(next.count, 1);
    }

    #[test]
    fn test_projects_are_counted_separately() {
        let limiter = FixedWindowLimiter::in_memory(60, 1);
        let now = at(1_700_000_000);

        assert!(limiter.check("a", now).allowed);
        assert!(!limiter.check("a", now).allowed);
        assert!(limiter.check("b", now).allowed);
    }

    #[test]
    fn test_old_windows_are_pruned() {
        let store = Arc::new(InMemoryCounterStore::new());
        let limiter = FixedWindowLimiter::new(store.clone(), 60, 10);

        limiter.check("a", at(0));
        limiter.check("b", at(1));
        assert_eq!(store.len(), 2);

        limiter.check("a", at(61));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let limiter = FixedWindowLimiter::in_memory(60, 1000);
        let now = at(1_700_000_000);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        limiter.check("proj", now);
                    }
                });
            }
        });

        assert_eq!(limiter.check("proj", now).count, 801);
    }
}
