use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// Expired windows are swept once every this many checks
const PRUNE_EVERY: u64 = 256;

// Rate limit entry - tracks requests per client
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

// Fixed window limiter in front of the data routes, keeps a runaway UI from draining quota
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window,
            checks: AtomicU64::new(0),
        }
    }

    pub fn check(&self, client_id: &str) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> bool {
        // client ids come from a request header, so the table must not grow forever
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        let mut entry = self
            .entries
            .entry(client_id.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired..? start a new one
        if now.saturating_duration_since(entry.window_start) > self.window {
            entry.count = 1;
            entry.window_start = now;
            return true;
        }

        if entry.count < self.limit {
            entry.count += 1;
            return true;
        }

        false
    }

    // Drop every client whose window has run out
    pub fn prune(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) <= self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_until_window_passes() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("ui", start));
        assert!(limiter.check_at("ui", start));
        assert!(!limiter.check_at("ui", start + Duration::from_secs(30)));
        // other clients have their own window
        assert!(limiter.check_at("other", start));

        assert!(limiter.check_at("ui", start + Duration::from_secs(61)));
    }

    #[test]
    fn expired_clients_are_swept_periodically() {
        let limiter = RateLimiter::new(1000, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..100 {
            limiter.check_at(&format!("10.0.0.{}", i), start);
        }
        assert_eq!(limiter.tracked_clients(), 100);

        let later = start + Duration::from_secs(120);
        for _ in 100..PRUNE_EVERY {
            limiter.check_at("steady", later);
        }
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn prune_keeps_live_windows() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(50));

        limiter.prune(start + Duration::from_secs(70));
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.check_at("fresh", start + Duration::from_secs(70)));
    }
}
