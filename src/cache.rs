use crate::clock::{Clock, SystemClock};
use crate::metrics::CACHE_SIZE;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Cache entry with timestamp and read count
#[derive(Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub reuse_count: u32,
}

impl<V> CacheEntry<V> {
    fn is_servable(&self, now: Instant, max_reuse: u32) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl && self.reuse_count < max_reuse
    }
}

/// Signature-keyed store bounded by age and by number of reads.
///
/// Expiry is lazy: the read that finds a stale or worn-out entry evicts it.
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    max_reuse: u32,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_reuse: u32) -> Self {
        Self::with_clock(max_reuse, Arc::new(SystemClock))
    }

    pub fn with_clock(max_reuse: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_reuse,
            clock,
        }
    }

    pub fn get(&self, signature: &str) -> Option<V> {
        let now = self.clock.now();

        match self.entries.entry(signature.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_servable(now, self.max_reuse) {
                    let cached = entry.get_mut();
                    cached.reuse_count += 1;
                    Some(cached.value.clone())
                } else {
                    entry.remove();
                    CACHE_SIZE.set(self.entries.len() as f64);
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    // Overwrites any previous entry and starts its read count at zero
    pub fn put(&self, signature: &str, value: V, ttl: Duration) {
        self.entries.insert(
            signature.to_string(),
            CacheEntry {
                value,
                created_at: self.clock.now(),
                ttl,
                reuse_count: 0,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn invalidate(&self, signature: &str) {
        self.entries.remove(signature);
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
        CACHE_SIZE.set(0.0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(60);

    fn cache(max_reuse: u32) -> (ResponseCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ResponseCache::with_clock(max_reuse, clock.clone()), clock)
    }

    #[test]
    fn served_just_before_ttl_and_evicted_just_after() {
        let (cache, clock) = cache(100);
        cache.put("sig", "value".to_string(), TTL);

        clock.advance(TTL - Duration::from_millis(1));
        assert_eq!(cache.get("sig").as_deref(), Some("value"));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get("sig"), None);
        assert!(!cache.contains("sig"));
    }

    #[test]
    fn expires_exactly_at_ttl() {
        let (cache, clock) = cache(100);
        cache.put("sig", "value".to_string(), TTL);
        clock.advance(TTL);
        assert_eq!(cache.get("sig"), None);
    }

    #[test]
    fn read_past_reuse_limit_evicts() {
        let (cache, _clock) = cache(3);
        cache.put("sig", "value".to_string(), TTL);

        for _ in 0..3 {
            assert!(cache.get("sig").is_some());
        }
        assert_eq!(cache.get("sig"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_resets_reuse_count() {
        let (cache, _clock) = cache(2);
        cache.put("sig", "old".to_string(), TTL);
        cache.get("sig");
        cache.get("sig");

        cache.put("sig", "new".to_string(), TTL);
        assert_eq!(cache.get("sig").as_deref(), Some("new"));
        assert_eq!(cache.get("sig").as_deref(), Some("new"));
        assert_eq!(cache.get("sig"), None);
    }

    #[test]
    fn invalidate_and_clear() {
        let (cache, _clock) = cache(10);
        cache.put("a", "1".to_string(), TTL);
        cache.put("b", "2".to_string(), TTL);

        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear_all();
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn miss_on_unknown_signature_leaves_nothing_behind() {
        let (cache, _clock) = cache(10);
        assert_eq!(cache.get("missing"), None);
        assert!(cache.is_empty());
    }
}
