//! Key/value cache backends.
//!
//! Two interchangeable implementations sit behind [`CacheBackend`]: a Redis
//! store shared between processes and an in-process map used when no remote
//! endpoint is configured or the remote one is unreachable at startup. The
//! choice is made once, in [`connect`]; callers never learn which one they got.
//!
//! Backends never return errors. Failed reads are absent values, failed writes
//! return `false`, and outages are logged once through [`OutageLog`].

mod memory;
mod outage;
mod remote;

pub use self::memory::LocalCache;
pub use self::outage::OutageLog;
pub use self::remote::RedisCache;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Redis => f.write_str("redis"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendHealth {
    Healthy { latency: Duration },
    Unhealthy { reason: String },
}

impl BackendHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BackendHealth::Healthy { .. })
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Value stored under `key`; expired and unreachable keys are both `None`.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` for `ttl` (whole seconds, at least one). Returns whether the write landed.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> bool;

    async fn ping(&self) -> BackendHealth;

    /// Remaining lifetime of `key`, `None` when absent or unknown.
    async fn ttl(&self, key: &str) -> Option<Duration>;

    /// Live keys starting with `prefix`; `None` when the backend could not be asked.
    async fn keys_with_prefix(&self, prefix: &str) -> Option<Vec<String>>;
}

/// Round a TTL to what both backends can honour: whole seconds, never zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Pick the backend for this process.
///
/// Redis is used only when an endpoint is configured and answers a ping
/// within the operation timeout; anything else falls back to [`LocalCache`].
pub async fn connect(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    let Some(endpoint) = config.redis_url.as_deref() else {
        info!("No remote cache endpoint configured, using in-process cache");
        return Arc::new(LocalCache::new());
    };

    match RedisCache::connect(endpoint, config.op_timeout()).await {
        Ok(cache) => match cache.ping().await {
            BackendHealth::Healthy { latency } => {
                info!(latency_ms = latency.as_millis() as u64, "Connected to Redis cache");
                Arc::new(cache)
            }
            BackendHealth::Unhealthy { reason } => {
                warn!(%reason, "Redis cache unhealthy at startup, using in-process cache");
                Arc::new(LocalCache::new())
            }
        },
        Err(e) => {
            warn!(error = %e, "Redis cache unreachable at startup, using in-process cache");
            Arc::new(LocalCache::new())
        }
    }
}
