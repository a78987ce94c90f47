use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use super::{ttl_secs, BackendHealth, BackendKind, CacheBackend, OutageLog};
use crate::app::{HeadwireError, Result};

/// Redis-backed cache shared between processes.
///
/// Every command runs under the configured operation timeout. The
/// `ConnectionManager` reconnects on its own after an outage.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    endpoint: String,
    op_timeout: Duration,
    outage: std::sync::Arc<OutageLog>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("endpoint", &self.endpoint)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(endpoint: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(endpoint)
            .map_err(|e| HeadwireError::BackendUnavailable(e.to_string()))?;
        let conn = timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| HeadwireError::BackendUnavailable(format!("connect to {} timed out", endpoint)))?
            .map_err(|e| HeadwireError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            conn,
            endpoint: endpoint.to_string(),
            op_timeout,
            outage: std::sync::Arc::new(OutageLog::new("redis")),
        })
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => {
                self.outage.success();
                Some(value)
            }
            Ok(Err(e)) => {
                self.outage.failure(op, &e);
                None
            }
            Err(_) => {
                self.outage.failure(op, &format!("timed out after {:?}", self.op_timeout));
                None
            }
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        let value = self
            .run("GET", async move { conn.get::<_, Option<String>>(key).await })
            .await
            .flatten();
        debug!(key, hit = value.is_some(), "Redis GET");
        value
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut conn = self.conn.clone();
        let secs = ttl_secs(ttl);
        self.run("SETEX", async move { conn.set_ex::<_, _, ()>(key, value, secs).await })
            .await
            .is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.conn.clone();
        self.run("DEL", async move { conn.del::<_, i64>(key).await })
            .await
            .is_some_and(|removed| removed > 0)
    }

    async fn ping(&self) -> BackendHealth {
        let mut conn = self.conn.clone();
        let started = Instant::now();
        let outcome = timeout(
            self.op_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await;

        match outcome {
            Ok(Ok(_)) => {
                self.outage.success();
                BackendHealth::Healthy {
                    latency: started.elapsed(),
                }
            }
            Ok(Err(e)) => {
                self.outage.failure("PING", &e);
                BackendHealth::Unhealthy {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                self.outage.failure("PING", &"timed out");
                BackendHealth::Unhealthy {
                    reason: format!("ping timed out after {:?}", self.op_timeout),
                }
            }
        }
    }

    async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut conn = self.conn.clone();
        // -2 means missing, -1 means no expiry
        self.run("TTL", async move { conn.ttl::<_, i64>(key).await })
            .await
            .filter(|secs| *secs >= 0)
            .map(|secs| Duration::from_secs(secs as u64))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Option<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        self.run("SCAN", async move {
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys.sort();
            Ok::<_, redis::RedisError>(keys)
        })
        .await
    }
}
