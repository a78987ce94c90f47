use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{ttl_secs, BackendHealth, BackendKind, CacheBackend};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expires_at(&self) -> Instant {
        self.inserted_at + self.ttl
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at()
    }
}

/// In-process cache with expire-on-read TTLs.
///
/// Lives only as long as the process. Uses tokio's clock so that paused-time
/// tests can drive expiry.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> T) -> T {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.with_entries(|entries| match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let entry = CacheEntry {
            value: value.to_string(),
            inserted_at: Instant::now(),
            ttl: Duration::from_secs(ttl_secs(ttl)),
        };
        self.with_entries(|entries| entries.insert(key.to_string(), entry));
        true
    }

    async fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.with_entries(|entries| {
            entries
                .remove(key)
                .is_some_and(|entry| entry.is_live(now))
        })
    }

    async fn ping(&self) -> BackendHealth {
        BackendHealth::Healthy {
            latency: Duration::ZERO,
        }
    }

    async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.with_entries(|entries| {
            entries
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.expires_at() - now)
        })
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Option<Vec<String>> {
        let now = Instant::now();
        let keys = self.with_entries(|entries| {
            entries.retain(|_, entry| entry.is_live(now));
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        });
        Some(keys)
    }
}
