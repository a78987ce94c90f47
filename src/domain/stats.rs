use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A retained history bucket, as listed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDescriptor {
    pub key: String,
    pub date: NaiveDate,
    pub captured_at: DateTime<Utc>,
    pub headline_count: usize,
}

/// Point-in-time report over the cache backend and history.
///
/// Every sub-query that could not be answered leaves its field `None` (or
/// zero for counts) and adds a line to `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedisStatistics {
    pub backend: String,
    /// A remote endpoint was configured, whether or not it is in use
    pub cache_configured: bool,
    pub available: bool,
    pub latency_ms: Option<f64>,
    pub cache_key: String,
    pub key_present: Option<bool>,
    pub ttl_seconds: Option<u64>,
    pub payload_bytes: Option<usize>,
    pub headline_count: usize,
    pub summary_count: usize,
    pub ticker_present: bool,
    pub sections: Vec<String>,
    pub sources: Vec<String>,
    pub latest_headline_title: Option<String>,
    pub latest_headline_source: Option<String>,
    pub latest_headline_time: Option<DateTime<Utc>>,
    pub historical_snapshot_count: Option<usize>,
    pub latest_snapshot_key: Option<String>,
    pub warnings: Vec<String>,
}
