use crate::endpoint::Endpoint;
use crate::metrics::QUOTA_UNITS;
use crate::models::{KeyUsage, QuotaLogEntry, QuotaSnapshot};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Ledger {
    per_key: BTreeMap<String, KeyUsage>,
    entries: Vec<QuotaLogEntry>,
}

// Per-key cost counters plus a log of every billed call.
// Both live behind one lock so a snapshot never sees one without the other.
#[derive(Default)]
pub struct QuotaTracker {
    ledger: Mutex<Ledger>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Bill one call; returns the key's new running total
    pub fn record(&self, endpoint: Endpoint, key_id: &str) -> u64 {
        let cost = endpoint.cost();

        let total = {
            let mut ledger = self.ledger();
            let usage = ledger.per_key.entry(key_id.to_string()).or_default();
            usage.cost += cost;
            usage.calls += 1;
            let total = usage.cost;

            ledger.entries.push(QuotaLogEntry {
                timestamp: chrono::Utc::now(),
                endpoint: endpoint.path().to_string(),
                cost,
                key_id: key_id.to_string(),
            });
            total
        };

        QUOTA_UNITS.with_label_values(&[key_id]).inc_by(cost as f64);
        total
    }

    pub fn usage(&self, key_id: &str) -> KeyUsage {
        self.ledger()
            .per_key
            .get(key_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.ledger().per_key.values().map(|u| u.cost).sum()
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        let ledger = self.ledger();
        QuotaSnapshot {
            total_cost: ledger.per_key.values().map(|u| u.cost).sum(),
            per_key: ledger.per_key.clone(),
            entries: ledger.entries.clone(),
        }
    }

    pub fn reset(&self) {
        let mut ledger = self.ledger();
        ledger.per_key.clear();
        ledger.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counters_match_the_log() {
        let tracker = QuotaTracker::new();
        tracker.record(Endpoint::Search, "key-1");
        tracker.record(Endpoint::Videos, "key-1");
        let total = tracker.record(Endpoint::PlaylistItems, "key-2");
        assert_eq!(total, 1);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_cost, 102);
        assert_eq!(snapshot.entries.len(), 3);

        for (key, usage) in &snapshot.per_key {
            let logged: u64 = snapshot
                .entries
                .iter()
                .filter(|e| &e.key_id == key)
                .map(|e| e.cost)
                .sum();
            assert_eq!(usage.cost, logged);
        }
        assert_eq!(tracker.usage("key-1"), KeyUsage { cost: 101, calls: 2 });
    }

    #[test]
    fn snapshots_stay_consistent_under_concurrent_billing() {
        let tracker = Arc::new(QuotaTracker::new());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    let key = format!("key-{}", i % 2 + 1);
                    for n in 0..500 {
                        let endpoint = if n % 5 == 0 {
                            Endpoint::Search
                        } else {
                            Endpoint::Videos
                        };
                        tracker.record(endpoint, &key);
                    }
                })
            })
            .collect();

        let reader = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = tracker.snapshot();
                    for (key, usage) in &snapshot.per_key {
                        let entries = snapshot.entries.iter().filter(|e| &e.key_id == key);
                        let logged: u64 = entries.clone().map(|e| e.cost).sum();
                        assert_eq!(usage.cost, logged);
                        assert_eq!(usage.calls, entries.count() as u64);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(tracker.snapshot().entries.len(), 2000);
    }

    #[test]
    fn reset_clears_everything() {
        let tracker = QuotaTracker::new();
        tracker.record(Endpoint::Channels, "key-1");
        tracker.reset();
        assert_eq!(tracker.total(), 0);
        assert!(tracker.snapshot().entries.is_empty());
        assert_eq!(tracker.usage("key-1"), KeyUsage::default());
    }
}
