use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::Result;
use crate::config::FetchConfig;
use crate::fetcher::{FetchRequest, FetchResponse, Fetcher};

const DEFAULT_REFERER: &str = "https://www.google.com/";

/// Bounded exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Pause after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Round-robin pool of user-agent strings.
///
/// Each retry loop takes its own starting point and walks forward from it, so
/// consecutive attempts for one URL never reuse an agent while the pool has
/// enough entries, even when many sections fetch at once.
#[derive(Debug)]
pub struct UserAgentPool {
    agents: Vec<String>,
    cursor: AtomicUsize,
}

impl UserAgentPool {
    pub fn new(agents: &[String]) -> Self {
        let agents: Vec<String> = agents
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        Self {
            agents,
            cursor: AtomicUsize::new(0),
        }
    }

    fn start(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }

    fn agent(&self, start: usize, attempt: u32) -> &str {
        if self.agents.is_empty() {
            return concat!("headwire/", env!("CARGO_PKG_VERSION"));
        }
        let index = start.wrapping_add(attempt.saturating_sub(1) as usize) % self.agents.len();
        &self.agents[index]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Result of a retry loop plus how many requests it took.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<FetchResponse>,
    pub attempts: u32,
}

/// GET `url`, retrying rejected and transient failures.
///
/// Every attempt uses the next user agent. Attempts after the first also send
/// a `Referer` and `Cache-Control: no-cache`. Backoff sleeps are plain tokio
/// sleeps, so dropping the future cancels the loop immediately.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    referer: Option<&str>,
    policy: &RetryPolicy,
    agents: &UserAgentPool,
) -> RetryOutcome {
    let start = agents.start();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let mut request = FetchRequest::new(url, agents.agent(start, attempt));
        if attempt > 1 {
            request = request
                .header("referer", referer.unwrap_or(DEFAULT_REFERER))
                .header("cache-control", "no-cache");
        }

        match fetcher.fetch(&request).await {
            Ok(response) => {
                debug!(url, attempt, "Fetched");
                return RetryOutcome {
                    result: Ok(response),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(url, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Retrying fetch");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "Giving up on fetch");
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}
