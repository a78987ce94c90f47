use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::Result;
use crate::cache::{self, BackendHealth, CacheBackend};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::domain::{ExclusionFilter, Headline, RedisStatistics, SnapshotDescriptor, SummaryKind, SummaryRecord};
use crate::fetcher::{FetchPipeline, Fetcher, HttpFetcher};
use crate::scheduler::{RefreshScheduler, SchedulerHandle, SchedulerOptions, SummarySource};
use crate::store::{HeadlineStore, SnapshotStore};
use crate::summary::{ArticleFetcher, LlmSummarizer, Summarizer, SummaryResolver};

/// Result of [`AppContext::clear_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    pub success: bool,
    pub message: String,
}

/// Wires the backend, stores, fetch pipeline and summary resolver together,
/// and is the surface a UI talks to.
pub struct AppContext {
    config: Config,
    backend: Arc<dyn CacheBackend>,
    store: HeadlineStore,
    snapshots: SnapshotStore,
    pipeline: Arc<FetchPipeline>,
    resolver: SummaryResolver,
    diagnostics: Diagnostics,
}

impl AppContext {
    /// Load `~/.config/headwire/config.toml` and build the context.
    pub async fn load() -> Result<Self> {
        Self::new(Config::load()?).await
    }

    /// Validate `config`, pick the cache backend and build every component.
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` for a bad configuration; nothing else fails here.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = cache::connect(&config.cache).await;
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetch.timeout())?);
        let summarizer = LlmSummarizer::from_config(&config.summary)?
            .map(|s| Arc::new(s) as Arc<dyn Summarizer>);
        if summarizer.is_none() {
            info!("No summary provider configured; summaries will use fallback text");
        }
        Ok(Self::with_parts(config, backend, fetcher, summarizer))
    }

    /// Build from explicit collaborators. `config` is assumed valid.
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn CacheBackend>,
        fetcher: Arc<dyn Fetcher>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        let store = HeadlineStore::new(backend.clone(), &config.cache);
        let snapshots = SnapshotStore::new(backend.clone(), &config.history);
        let pipeline = Arc::new(FetchPipeline::new(fetcher, &config.fetch));
        let articles = ArticleFetcher::new(
            pipeline.fetcher().clone(),
            pipeline.agents().clone(),
            *pipeline.policy(),
            &config.summary,
        );
        let resolver = SummaryResolver::new(store.clone(), summarizer, articles, &config.summary, &config.cache);
        let diagnostics = Diagnostics::new(store.clone(), snapshots.clone(), &config);

        Self {
            config,
            backend,
            store,
            snapshots,
            pipeline,
            resolver,
            diagnostics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &HeadlineStore {
        &self.store
    }

    /// Spawn the refresh scheduler onto the current runtime.
    pub fn start_scheduler(&self) -> (SchedulerHandle, JoinHandle<()>) {
        let summaries = self
            .config
            .refresh
            .summarize
            .then(|| Arc::new(self.resolver.clone()) as Arc<dyn SummarySource>);
        let (scheduler, handle) = RefreshScheduler::new(
            self.pipeline.clone(),
            summaries,
            self.store.clone(),
            self.snapshots.clone(),
            self.config.fetch.sections.clone(),
            ExclusionFilter::new(&self.config.refresh.exclusions),
            SchedulerOptions::from_config(&self.config.refresh),
        );
        let task = tokio::spawn(scheduler.run());
        (handle, task)
    }

    /// Full article summary for one headline. Never fails; see [`SummaryResolver`].
    pub async fn resolve_summary(&self, headline: &Headline) -> SummaryRecord {
        self.resolver.resolve(headline, SummaryKind::Article).await
    }

    pub async fn diagnostics(&self) -> RedisStatistics {
        self.diagnostics.collect().await
    }

    pub async fn list_snapshots(&self, within_days: u32) -> Vec<SnapshotDescriptor> {
        self.snapshots.list(within_days).await
    }

    pub async fn load_snapshot(&self, date: NaiveDate) -> Option<Vec<Headline>> {
        self.snapshots.load(date).await.map(|bundle| bundle.headlines)
    }

    /// Remove the primary key, every history bucket and every cached summary.
    pub async fn clear_cache(&self) -> ClearOutcome {
        if let BackendHealth::Unhealthy { reason } = self.backend.ping().await {
            return ClearOutcome {
                success: false,
                message: format!("Cache backend unavailable: {}", reason),
            };
        }

        let primary = self.store.clear_current().await;
        let snapshots = self.snapshots.clear().await;
        let summaries = self.store.clear_summaries().await;
        info!(primary, snapshots, summaries, "Cache cleared");

        ClearOutcome {
            success: true,
            message: clear_message(primary, snapshots, summaries),
        }
    }
}

/// Describe only what a clear actually removed.
fn clear_message(primary: bool, snapshots: usize, summaries: usize) -> String {
    let mut removed = Vec::new();
    if primary {
        removed.push("primary key".to_string());
    }
    if snapshots > 0 {
        let plural = if snapshots == 1 { "" } else { "s" };
        removed.push(format!("{} historical snapshot{}", snapshots, plural));
    }
    if summaries > 0 {
        let noun = if summaries == 1 { "summary" } else { "summaries" };
        removed.push(format!("{} cached {}", summaries, noun));
    }
    if removed.is_empty() {
        "Cache already empty.".to_string()
    } else {
        format!("Cache cleared ({}).", removed.join(", "))
    }
}
