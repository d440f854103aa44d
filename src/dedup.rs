//! Collapses concurrent identical requests into one upstream call.
//!
//! The first caller for a signature spawns the producer on its own task and
//! publishes a shared handle to it. Later callers with the same signature
//! await that handle. The entry is dropped from the table as soon as the
//! producer settles, before any waiter sees the value, so nobody can join a
//! finished call. The producer keeps running even if every waiter goes away.

use crate::error::DedupError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;

type InFlight<T> = Shared<BoxFuture<'static, Result<T, DedupError>>>;

pub struct Deduplicator<T> {
    in_flight: Arc<DashMap<String, InFlight<T>>>,
}

// Removes the table entry when the producer task finishes, panics included
struct Settle<T> {
    table: Arc<DashMap<String, InFlight<T>>>,
    signature: String,
}

impl<T> Drop for Settle<T> {
    fn drop(&mut self) {
        self.table.remove(&self.signature);
    }
}

impl<T> Default for Deduplicator<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `producer` unless a call for `signature` is already in flight,
    /// in which case the caller gets that call's result instead.
    pub async fn run<F, Fut>(&self, signature: &str, producer: F) -> Result<T, DedupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = match self.in_flight.entry(signature.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight request {}", signature);
                entry.get().clone()
            }
            Entry::Vacant(slot) => {
                let work = producer();
                let settle = Settle {
                    table: Arc::clone(&self.in_flight),
                    signature: signature.to_string(),
                };

                // The shard lock is held until `insert` returns, so the task's
                // removal cannot overtake the insertion.
                let handle = tokio::spawn(async move {
                    let _settle = settle;
                    work.await
                });

                let owned = signature.to_string();
                let shared = async move {
                    handle
                        .await
                        .map_err(|e| DedupError::ProducerFailed(owned, e.to_string()))
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                shared
            }
        };

        shared.await
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, signature: &str) -> bool {
        self.in_flight.contains_key(signature)
    }
}
