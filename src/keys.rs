use crate::error::ConfigError;
use crate::models::KeyStatus;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// Single upstream credential

pub struct ApiKey {
    pub id: String,
    pub priority: usize,
    secret: String,
    exhausted: AtomicBool, // got a 403 with this key
}

impl ApiKey {
    pub fn new(id: String, secret: String, priority: usize) -> Self {
        Self {
            id,
            priority,
            secret,
            exhausted: AtomicBool::new(false),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::Relaxed);
    }
}

// Never print the secret
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

// Ordered key list with a round-robin cursor

pub struct KeyRegistry {
    keys: Vec<Arc<ApiKey>>,
    cursor: AtomicUsize,
}

impl KeyRegistry {
    // Keys keep the order they were configured in; blanks are skipped
    pub fn new<I, S>(secrets: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<Arc<ApiKey>> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, secret)| Arc::new(ApiKey::new(format!("key-{}", i + 1), secret, i)))
            .collect();

        if keys.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }

        tracing::info!("Key registry initialized with {} keys", keys.len());

        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_key(&self) -> Arc<ApiKey> {
        let idx = self.cursor.load(Ordering::SeqCst) % self.keys.len();
        Arc::clone(&self.keys[idx])
    }

    // Advance the cursor by one and hand back the key it now points at
    pub fn rotate(&self) -> Arc<ApiKey> {
        let next = self.cursor.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        Arc::clone(&self.keys[next % self.keys.len()])
    }

    /// Rotate away from `failed`, unless a concurrent caller already did.
    ///
    /// Returns the key the cursor points at afterwards.
    pub fn advance_past(&self, failed: &ApiKey) -> Arc<ApiKey> {
        let len = self.keys.len();
        loop {
            let cur = self.cursor.load(Ordering::SeqCst);
            if self.keys[cur % len].id != failed.id {
                return Arc::clone(&self.keys[cur % len]);
            }
            if self
                .cursor
                .compare_exchange(cur, cur.wrapping_add(1), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Arc::clone(&self.keys[cur.wrapping_add(1) % len]);
            }
        }
    }

    pub fn all_keys(&self) -> &[Arc<ApiKey>] {
        &self.keys
    }

    pub fn mark_exhausted(&self, key: &ApiKey) {
        key.set_exhausted(true);
    }

    pub fn exhausted_count(&self) -> usize {
        self.keys.iter().filter(|k| k.is_exhausted()).count()
    }

    pub fn reset_exhausted(&self) {
        for key in &self.keys {
            key.set_exhausted(false);
        }
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
        self.reset_exhausted();
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Vec<KeyStatus> {
        let current = self.current_key();
        self.keys
            .iter()
            .map(|k| KeyStatus {
                id: k.id.clone(),
                priority: k.priority,
                exhausted: k.is_exhausted(),
                current: Arc::ptr_eq(k, &current),
            })
            .collect()
    }
}
