use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::cache::CacheBackend;
use crate::config::HistoryConfig;
use crate::domain::{HeadlineBundle, SnapshotDescriptor};

const BUCKET_SUFFIX: &str = "headlines";

/// One history bucket per calendar day, `<prefix>:<YYYY-MM-DD>:headlines`.
///
/// A bucket is written whole; recording twice on the same day replaces it.
/// Readers never see a bucket whose capture time is older than the history
/// TTL, even when the backend has not evicted it yet.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    ttl: Duration,
    enabled: bool,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &HistoryConfig) -> Self {
        Self {
            backend,
            prefix: config.prefix.trim().to_string(),
            ttl: config.ttl(),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn bucket_key(&self, date: NaiveDate) -> String {
        format!("{}:{}:{}", self.prefix, date.format("%Y-%m-%d"), BUCKET_SUFFIX)
    }

    fn parse_bucket_date(&self, key: &str) -> Option<NaiveDate> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix(':')?;
        let (date_part, suffix) = rest.split_once(':')?;
        if suffix != BUCKET_SUFFIX {
            return None;
        }
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }

    fn within_ttl(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => captured_at + ttl > now,
            Err(_) => true,
        }
    }

    /// Write (or replace) the bucket for `date`.
    pub async fn record(&self, date: NaiveDate, bundle: &HeadlineBundle) -> bool {
        if !self.enabled {
            return false;
        }
        let key = self.bucket_key(date);
        let payload = match serde_json::to_string(bundle) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%key, error = %e, "Failed to serialize snapshot");
                return false;
            }
        };
        let stored = self.backend.set(&key, &payload, self.ttl).await;
        debug!(%key, stored, headlines = bundle.headlines.len(), "Recorded snapshot");
        stored
    }

    pub async fn load(&self, date: NaiveDate) -> Option<HeadlineBundle> {
        self.load_as_of(date, Utc::now()).await
    }

    pub async fn load_as_of(&self, date: NaiveDate, now: DateTime<Utc>) -> Option<HeadlineBundle> {
        if !self.enabled {
            return None;
        }
        let key = self.bucket_key(date);
        let raw = self.backend.get(&key).await?;
        let bundle: HeadlineBundle = match serde_json::from_str(&raw) {
            Ok(bundle) => bundle,
            Err(e) => {
                debug!(%key, error = %e, "Snapshot payload is not valid JSON");
                return None;
            }
        };
        self.within_ttl(bundle.captured_at, now).then_some(bundle)
    }

    /// Buckets from the last `within_days` days (today counts as one), newest first.
    pub async fn list(&self, within_days: u32) -> Vec<SnapshotDescriptor> {
        self.list_as_of(Utc::now(), within_days).await.unwrap_or_default()
    }

    /// Like [`list`](Self::list) but reports an unreachable backend as `None`.
    pub async fn list_as_of(&self, now: DateTime<Utc>, within_days: u32) -> Option<Vec<SnapshotDescriptor>> {
        if !self.enabled {
            return Some(Vec::new());
        }
        let keys = self.backend.keys_with_prefix(&format!("{}:", self.prefix)).await?;
        let today = now.date_naive();
        let window = i64::from(within_days.max(1));

        let mut dated: Vec<(NaiveDate, String)> = keys
            .into_iter()
            .filter_map(|key| self.parse_bucket_date(&key).map(|date| (date, key)))
            .filter(|(date, _)| {
                let age = today.signed_duration_since(*date).num_days();
                (0..window).contains(&age)
            })
            .collect();
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        let mut descriptors = Vec::with_capacity(dated.len());
        for (date, key) in dated {
            if let Some(bundle) = self.load_as_of(date, now).await {
                descriptors.push(SnapshotDescriptor {
                    key,
                    date,
                    captured_at: bundle.captured_at,
                    headline_count: bundle.headlines.len(),
                });
            }
        }
        Some(descriptors)
    }

    /// Delete every bucket under the prefix, returning how many were removed.
    pub async fn clear(&self) -> usize {
        let Some(keys) = self.backend.keys_with_prefix(&format!("{}:", self.prefix)).await else {
            return 0;
        };
        let mut removed = 0;
        for key in keys.iter().filter(|key| self.parse_bucket_date(key).is_some()) {
            if self.backend.delete(key).await {
                removed += 1;
            }
        }
        removed
    }
}
