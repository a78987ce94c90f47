use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::FetchConfig;
use crate::domain::{Headline, Section};
use crate::fetcher::{fetch_with_retry, Fetcher, RetryPolicy, UserAgentPool};
use crate::normalizer::{self, Normalizer};

/// How one section fared in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    Fetched { count: usize },
    Failed { reason: String },
    /// Fetch failed or came back short; the previous cycle's headlines were kept
    PreservedPrior { count: usize, reason: String },
}

#[derive(Debug, Clone)]
pub struct SectionResult {
    pub section: Section,
    pub status: SectionStatus,
    pub attempts: u32,
    pub headlines: Vec<Headline>,
}

impl SectionResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, SectionStatus::Fetched { .. })
    }
}

/// Per-section results in configured order. Failures are data, never errors.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub sections: Vec<SectionResult>,
}

impl FetchReport {
    pub fn successful_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.succeeded()).count()
    }

    /// All headlines mixed round-robin across sections, duplicates dropped.
    pub fn headlines(&self) -> Vec<Headline> {
        let lists: Vec<Vec<Headline>> = self.sections.iter().map(|s| s.headlines.clone()).collect();
        normalizer::interleave(&lists)
    }
}

pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
    agents: Arc<UserAgentPool>,
    normalizer: Normalizer,
}

impl FetchPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &FetchConfig) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            policy: RetryPolicy::from_config(config),
            agents: Arc::new(UserAgentPool::new(&config.user_agents)),
            normalizer: Normalizer::new(config),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn agents(&self) -> &Arc<UserAgentPool> {
        &self.agents
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch every section with bounded concurrency.
    ///
    /// Dropping the returned future aborts all outstanding section tasks.
    pub async fn fetch_sections(&self, sections: &[Section]) -> FetchReport {
        let mut tasks = JoinSet::new();

        for (index, section) in sections.iter().cloned().enumerate() {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let agents = self.agents.clone();
            let policy = self.policy;
            let normalizer = self.normalizer.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_single_section(fetcher.as_ref(), &section, &policy, &agents, &normalizer).await,
                    Err(_) => SectionResult {
                        status: SectionStatus::Failed {
                            reason: "fetch pool closed".to_string(),
                        },
                        section,
                        attempts: 0,
                        headlines: Vec::new(),
                    },
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<SectionResult>> = vec![None; sections.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!("Section task join error: {}", e),
            }
        }

        let sections = slots
            .into_iter()
            .zip(sections)
            .map(|(slot, section)| {
                slot.unwrap_or_else(|| SectionResult {
                    section: section.clone(),
                    status: SectionStatus::Failed {
                        reason: "section task panicked".to_string(),
                    },
                    attempts: 0,
                    headlines: Vec::new(),
                })
            })
            .collect();

        FetchReport { sections }
    }
}

async fn fetch_single_section(
    fetcher: &dyn Fetcher,
    section: &Section,
    policy: &RetryPolicy,
    agents: &UserAgentPool,
    normalizer: &Normalizer,
) -> SectionResult {
    let outcome = fetch_with_retry(fetcher, &section.url, Some(&section.url), policy, agents).await;

    let (status, headlines) = match outcome.result {
        Ok(response) => match normalizer.normalize(section, &response.body) {
            Ok(headlines) => {
                tracing::info!(section = %section.label, count = headlines.len(), "Fetched section");
                (SectionStatus::Fetched { count: headlines.len() }, headlines)
            }
            Err(e) => (SectionStatus::Failed { reason: e.to_string() }, Vec::new()),
        },
        Err(e) => {
            tracing::warn!(section = %section.label, attempts = outcome.attempts, error = %e, "Section fetch failed");
            (SectionStatus::Failed { reason: e.to_string() }, Vec::new())
        }
    };

    SectionResult {
        section: section.clone(),
        status,
        attempts: outcome.attempts,
        headlines,
    }
}
