use std::collections::BTreeSet;

use chrono::Utc;
use tracing::debug;

use crate::cache::BackendHealth;
use crate::config::Config;
use crate::domain::{HeadlineBundle, RedisStatistics};
use crate::store::{HeadlineStore, SnapshotStore};

/// Read-only health report over the cache backend and history.
pub struct Diagnostics {
    store: HeadlineStore,
    snapshots: SnapshotStore,
    cache_configured: bool,
    history_days: u32,
}

impl Diagnostics {
    pub fn new(store: HeadlineStore, snapshots: SnapshotStore, config: &Config) -> Self {
        // One extra day so yesterday's bucket is counted while its TTL still runs.
        let days = config.history.ttl().as_secs().div_ceil(86_400) + 1;
        Self {
            store,
            snapshots,
            cache_configured: config.cache.redis_url.is_some(),
            history_days: u32::try_from(days).unwrap_or(u32::MAX),
        }
    }

    /// Gather statistics. Each failed sub-query becomes a warning, never an error.
    pub async fn collect(&self) -> RedisStatistics {
        let backend = self.store.backend();
        let mut stats = RedisStatistics {
            backend: backend.kind().to_string(),
            cache_configured: self.cache_configured,
            cache_key: self.store.key().to_string(),
            ..Default::default()
        };

        match backend.ping().await {
            BackendHealth::Healthy { latency } => {
                stats.available = true;
                stats.latency_ms = Some(latency.as_secs_f64() * 1000.0);
            }
            BackendHealth::Unhealthy { reason } => {
                stats.warnings.push(format!("Cache backend unreachable: {}", reason));
            }
        }

        match self.store.load_raw().await {
            Some(raw) => {
                stats.key_present = Some(true);
                stats.payload_bytes = Some(raw.len());
                match serde_json::from_str::<HeadlineBundle>(&raw) {
                    Ok(bundle) => describe_bundle(&mut stats, &bundle),
                    Err(e) => stats.warnings.push(format!("Cached headlines are unreadable: {}", e)),
                }
                match backend.ttl(self.store.key()).await {
                    Some(ttl) => stats.ttl_seconds = Some(ttl.as_secs()),
                    None => stats.warnings.push("TTL of the primary key is unavailable".to_string()),
                }
            }
            None if stats.available => stats.key_present = Some(false),
            None => stats.warnings.push("Primary key could not be read".to_string()),
        }

        match self.snapshots.list_as_of(Utc::now(), self.history_days).await {
            Some(listed) => {
                stats.historical_snapshot_count = Some(listed.len());
                stats.latest_snapshot_key = listed.first().map(|d| d.key.clone());
            }
            None => stats.warnings.push("Historical snapshots could not be listed".to_string()),
        }

        debug!(backend = %stats.backend, available = stats.available, warnings = stats.warnings.len(), "Collected diagnostics");
        stats
    }
}

fn describe_bundle(stats: &mut RedisStatistics, bundle: &HeadlineBundle) {
    stats.headline_count = bundle.headlines.len();
    stats.summary_count = bundle.headlines.iter().filter(|h| h.summary.is_some()).count();
    stats.ticker_present = !bundle.ticker.trim().is_empty();

    let mut sections = Vec::new();
    for headline in &bundle.headlines {
        if !sections.contains(&headline.section) {
            sections.push(headline.section.clone());
        }
    }
    stats.sections = sections;
    stats.sources = bundle
        .headlines
        .iter()
        .filter_map(|h| h.source.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if let Some(latest) = bundle
        .headlines
        .iter()
        .max_by_key(|h| h.published_at.unwrap_or(h.fetched_at))
    {
        stats.latest_headline_title = Some(latest.title.clone());
        stats.latest_headline_source = latest.source.clone();
        stats.latest_headline_time = Some(latest.published_at.unwrap_or(latest.fetched_at));
    }
}
