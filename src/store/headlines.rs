use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::CacheBackend;
use crate::config::CacheConfig;
use crate::domain::{HeadlineBundle, SummaryKind, SummaryRecord};

/// The primary key holding the current result set, plus per-headline
/// summary records stored next to it.
///
/// Summary keys are `<primary key>:summary:<kind>:<fingerprint>` and use
/// their own retention so summaries outlive the headline payload.
#[derive(Clone)]
pub struct HeadlineStore {
    backend: Arc<dyn CacheBackend>,
    key: String,
    ttl: Duration,
    summary_retention: Duration,
}

impl HeadlineStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            key: config.key.clone(),
            ttl: config.ttl(),
            summary_retention: config.summary_retention(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Raw payload under the primary key.
    pub async fn load_raw(&self) -> Option<String> {
        self.backend.get(&self.key).await
    }

    pub async fn load_current(&self) -> Option<HeadlineBundle> {
        let raw = self.load_raw().await?;
        match serde_json::from_str(&raw) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Ignoring unreadable cached headlines");
                None
            }
        }
    }

    pub async fn save_current(&self, bundle: &HeadlineBundle) -> bool {
        match serde_json::to_string(bundle) {
            Ok(payload) => self.backend.set(&self.key, &payload, self.ttl).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize headlines");
                false
            }
        }
    }

    pub async fn clear_current(&self) -> bool {
        self.backend.delete(&self.key).await
    }

    fn summary_prefix(&self) -> String {
        format!("{}:summary:", self.key)
    }

    pub fn summary_key(&self, fingerprint: &str, kind: SummaryKind) -> String {
        format!("{}{}:{}", self.summary_prefix(), kind, fingerprint)
    }

    pub async fn load_summary(&self, fingerprint: &str, kind: SummaryKind) -> Option<SummaryRecord> {
        let key = self.summary_key(fingerprint, kind);
        let raw = self.backend.get(&key).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(%key, error = %e, "Ignoring unreadable summary record");
                None
            }
        }
    }

    pub async fn save_summary(&self, record: &SummaryRecord) -> bool {
        let key = self.summary_key(&record.fingerprint, record.kind);
        match serde_json::to_string(record) {
            Ok(payload) => self.backend.set(&key, &payload, self.summary_retention).await,
            Err(e) => {
                warn!(%key, error = %e, "Failed to serialize summary record");
                false
            }
        }
    }

    /// Keys of every stored summary; `None` when the backend could not list them.
    pub async fn summary_keys(&self) -> Option<Vec<String>> {
        self.backend.keys_with_prefix(&self.summary_prefix()).await
    }

    /// Remove every stored summary, returning how many were deleted.
    pub async fn clear_summaries(&self) -> usize {
        let Some(keys) = self.summary_keys().await else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if self.backend.delete(&key).await {
                removed += 1;
            }
        }
        removed
    }
}
