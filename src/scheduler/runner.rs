use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::RefreshConfig;
use crate::domain::{ExclusionFilter, Headline, HeadlineBundle, Section};
use crate::fetcher::SectionStatus;
use crate::normalizer;
use crate::scheduler::{
    CycleReport, HeadlineSource, SchedulerHandle, SchedulerState, SectionOutcome, Shared, SummarySource,
};
use crate::store::{HeadlineStore, SnapshotStore};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub failure_backoff: Duration,
    pub on_start: bool,
    pub watch_enabled: bool,
    pub summarize: bool,
    pub summary_workers: usize,
    pub min_section_headlines: usize,
}

impl SchedulerOptions {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            interval: config.interval(),
            failure_backoff: config.failure_backoff(),
            on_start: config.on_start,
            watch_enabled: config.watch_enabled,
            summarize: config.summarize,
            summary_workers: config.summary_workers.max(1),
            min_section_headlines: config.min_section_headlines,
        }
    }

    /// Delay before retrying after `failures` consecutive empty cycles.
    fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1).min(16));
        self.failure_backoff.saturating_mul(factor).min(self.interval)
    }
}

/// Work collected by one cycle, not yet written anywhere.
struct CyclePlan {
    started_at: DateTime<Utc>,
    clock: Instant,
    sections: Vec<SectionOutcome>,
    fetched: usize,
    headlines: Vec<Headline>,
}

struct Cycle {
    headlines: Arc<dyn HeadlineSource>,
    summaries: Option<Arc<dyn SummarySource>>,
    store: HeadlineStore,
    snapshots: SnapshotStore,
    sections: Vec<Section>,
    filter: ExclusionFilter,
    options: SchedulerOptions,
    shared: Arc<Shared>,
    /// Fingerprints of the last committed set; `None` until the first commit or while the watch is off
    last_seen: Option<HashSet<String>>,
}

/// Owns the refresh loop. Create with [`RefreshScheduler::new`], then spawn
/// [`run`](Self::run) and keep the returned [`SchedulerHandle`].
pub struct RefreshScheduler {
    cycle: Cycle,
    triggers: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
}

impl RefreshScheduler {
    pub fn new(
        headlines: Arc<dyn HeadlineSource>,
        summaries: Option<Arc<dyn SummarySource>>,
        store: HeadlineStore,
        snapshots: SnapshotStore,
        sections: Vec<Section>,
        filter: ExclusionFilter,
        options: SchedulerOptions,
    ) -> (Self, SchedulerHandle) {
        let shared = Arc::new(Shared::new());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SchedulerHandle {
            triggers: trigger_tx,
            shutdown: Arc::new(shutdown_tx),
            shared: shared.clone(),
        };
        let scheduler = Self {
            cycle: Cycle {
                headlines,
                summaries,
                store,
                snapshots,
                sections,
                filter,
                options,
                shared: shared.clone(),
                last_seen: None,
            },
            triggers: trigger_rx,
            shutdown: shutdown_rx,
            shared,
        };
        (scheduler, handle)
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut cycle,
            mut triggers,
            mut shutdown,
            shared,
        } = self;
        let interval = cycle.options.interval;
        info!(
            interval_secs = interval.as_secs(),
            sections = cycle.sections.len(),
            "Refresh scheduler started"
        );

        let mut next = if cycle.options.on_start {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let mut failures = 0u32;

        loop {
            shared.set_next_run(wall_clock(next));
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep_until(next) => {}
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                    debug!("Manual refresh requested");
                }
            }
            if *shutdown.borrow() {
                break;
            }

            shared.set_state(SchedulerState::Refreshing);
            shared.set_next_run(None);
            let started = Instant::now();

            let plan = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Refresh cancelled mid-cycle; nothing committed");
                    break;
                }
                plan = cycle.prepare() => plan,
            };
            let report = cycle.commit(plan).await;

            // Triggers that slipped in while refreshing are already satisfied.
            while triggers.try_recv().is_ok() {}

            if report.committed {
                failures = 0;
                next = started + interval;
                let now = Instant::now();
                while next < now {
                    next += interval;
                }
                shared.set_state(SchedulerState::Idle);
            } else {
                failures += 1;
                let delay = cycle.options.backoff_delay(failures);
                warn!(failures, delay_secs = delay.as_secs(), "Refresh produced nothing; backing off");
                next = Instant::now() + delay;
                shared.set_state(SchedulerState::BackoffWait);
            }
            shared.finish_cycle(report);
        }

        shared.set_state(SchedulerState::Cancelled);
        shared.set_next_run(None);
        info!("Refresh scheduler stopped");
    }
}

impl Cycle {
    async fn prepare(&self) -> CyclePlan {
        let started_at = Utc::now();
        let clock = Instant::now();

        let report = self.headlines.fetch_sections(&self.sections).await;
        let fetched = report.successful_sections();
        let prior = self.prior_headlines().await;
        let fresh_fingerprints: HashSet<String> = report
            .sections
            .iter()
            .flat_map(|s| s.headlines.iter().map(|h| h.fingerprint.clone()))
            .collect();

        let mut lists = Vec::with_capacity(report.sections.len());
        let mut outcomes = Vec::with_capacity(report.sections.len());

        for result in report.sections {
            let label = result.section.label.clone();
            let fresh = self.filter.apply(result.headlines);

            let status = match result.status {
                SectionStatus::Fetched { .. } if fresh.len() >= self.options.min_section_headlines => {
                    let count = fresh.len();
                    lists.push(fresh);
                    SectionStatus::Fetched { count }
                }
                status => {
                    let reason = match &status {
                        SectionStatus::Failed { reason } | SectionStatus::PreservedPrior { reason, .. } => {
                            reason.clone()
                        }
                        SectionStatus::Fetched { .. } => format!("only {} fresh headlines", fresh.len()),
                    };
                    let kept: Vec<Headline> = prior
                        .iter()
                        .filter(|h| h.section == label)
                        .filter(|h| !fresh_fingerprints.contains(&h.fingerprint))
                        .filter(|h| !self.filter.excludes(h))
                        .map(Headline::as_stale)
                        .collect();

                    if kept.is_empty() {
                        let status = match status {
                            SectionStatus::Fetched { .. } => SectionStatus::Fetched { count: fresh.len() },
                            other => other,
                        };
                        lists.push(fresh);
                        status
                    } else {
                        warn!(section = %label, kept = kept.len(), %reason, "Keeping previous headlines for section");
                        let count = kept.len();
                        lists.push(fresh.into_iter().chain(kept).collect());
                        SectionStatus::PreservedPrior { count, reason }
                    }
                }
            };

            outcomes.push(SectionOutcome {
                label,
                attempts: result.attempts,
                status,
            });
        }

        let mut headlines = normalizer::interleave(&lists);
        if self.options.summarize {
            if let Some(summaries) = &self.summaries {
                headlines = self.attach_summaries(summaries.clone(), headlines).await;
            }
        }

        CyclePlan {
            started_at,
            clock,
            sections: outcomes,
            fetched,
            headlines,
        }
    }

    /// Headlines to preserve from: the in-memory set, or the cache on a cold start.
    async fn prior_headlines(&self) -> Vec<Headline> {
        let current = self.shared.current();
        if !current.is_empty() {
            return current;
        }
        match self.store.load_current().await {
            Some(bundle) => {
                debug!(count = bundle.headlines.len(), "Warm start from cached headlines");
                bundle.headlines
            }
            None => Vec::new(),
        }
    }

    async fn attach_summaries(&self, summaries: Arc<dyn SummarySource>, headlines: Vec<Headline>) -> Vec<Headline> {
        stream::iter(headlines)
            .map(|headline| {
                let summaries = summaries.clone();
                async move {
                    if headline.summary.is_some() {
                        return headline;
                    }
                    let record = summaries.ticker_summary(&headline).await;
                    if record.is_fallback {
                        headline
                    } else {
                        headline.with_summary(summaries.summary_key(&headline.fingerprint), record.text)
                    }
                }
            })
            .buffered(self.options.summary_workers.max(1))
            .collect()
            .await
    }

    /// Write the plan out, or nothing at all when no section was fetched.
    async fn commit(&mut self, plan: CyclePlan) -> CycleReport {
        let mut report = CycleReport {
            started_at: plan.started_at,
            duration_ms: 0,
            headline_count: plan.headlines.len(),
            sections: plan.sections,
            committed: false,
            new_unseen: 0,
        };

        if plan.fetched == 0 {
            warn!(sections = report.sections.len(), "No section could be fetched; keeping previous headlines");
        } else {
            let bundle = HeadlineBundle::new(plan.headlines, plan.started_at);
            if !self.store.save_current(&bundle).await {
                warn!(key = %self.store.key(), "Current headlines were not cached");
            }
            if self.snapshots.is_enabled() && !self.snapshots.record(plan.started_at.date_naive(), &bundle).await {
                warn!("Snapshot was not recorded");
            }
            report.new_unseen = self.track_unseen(&bundle.headlines);
            self.shared.replace_current(bundle.headlines, report.new_unseen);
            report.committed = true;
            info!(
                headlines = report.headline_count,
                fetched = plan.fetched,
                new_unseen = report.new_unseen,
                "Refresh committed"
            );
        }

        report.duration_ms = u64::try_from(plan.clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        report
    }

    /// New fingerprints relative to the previous commit. The first commit is the baseline.
    fn track_unseen(&mut self, headlines: &[Headline]) -> usize {
        if !self.options.watch_enabled {
            self.last_seen = None;
            return 0;
        }
        let fingerprints: HashSet<String> = headlines.iter().map(|h| h.fingerprint.clone()).collect();
        let new = match &self.last_seen {
            Some(seen) => fingerprints.difference(seen).count(),
            None => 0,
        };
        self.last_seen = Some(fingerprints);
        new
    }
}

fn wall_clock(at: Instant) -> Option<DateTime<Utc>> {
    let ahead = chrono::Duration::from_std(at.saturating_duration_since(Instant::now())).ok()?;
    Some(Utc::now() + ahead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::config::{CacheConfig, HistoryConfig};
    use crate::domain::{SummaryKind, SummaryRecord};
    use crate::fetcher::{FetchReport, SectionResult};
    use crate::scheduler::TriggerOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Script = Box<dyn Fn(usize) -> Vec<SectionResult> + Send + Sync>;

    /// Returns `script(cycle)` after `delay`, recording when each cycle started.
    struct FakeSource {
        delay: Duration,
        script: Script,
        starts: Mutex<Vec<Instant>>,
    }

    impl FakeSource {
        fn new(delay: Duration, script: impl Fn(usize) -> Vec<SectionResult> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                delay,
                script: Box::new(script),
                starts: Mutex::new(Vec::new()),
            })
        }

        fn starts(&self) -> Vec<Instant> {
            self.starts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HeadlineSource for FakeSource {
        async fn fetch_sections(&self, _sections: &[Section]) -> FetchReport {
            let cycle = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(Instant::now());
                starts.len() - 1
            };
            tokio::time::sleep(self.delay).await;
            FetchReport {
                sections: (self.script)(cycle),
            }
        }
    }

    struct EchoSummaries;

    #[async_trait]
    impl SummarySource for EchoSummaries {
        fn summary_key(&self, fingerprint: &str) -> String {
            format!("test:summary:ticker:{}", fingerprint)
        }

        async fn ticker_summary(&self, headline: &Headline) -> SummaryRecord {
            SummaryRecord {
                fingerprint: headline.fingerprint.clone(),
                kind: SummaryKind::Ticker,
                text: format!("about {}", headline.title),
                model: Some("echo".into()),
                created_at: Utc::now(),
                is_fallback: false,
                issue: None,
            }
        }
    }

    fn fetched(label: &str, titles: &[&str]) -> SectionResult {
        let headlines: Vec<Headline> = titles
            .iter()
            .map(|t| Headline::new(label, t, &format!("https://example.com/{}", t.replace(' ', "-"))))
            .collect();
        SectionResult {
            section: Section::new(label, format!("https://example.com/{}", label)),
            status: SectionStatus::Fetched { count: headlines.len() },
            attempts: 1,
            headlines,
        }
    }

    fn failed(label: &str) -> SectionResult {
        SectionResult {
            section: Section::new(label, format!("https://example.com/{}", label)),
            status: SectionStatus::Failed {
                reason: "rejected with status 429".into(),
            },
            attempts: 3,
            headlines: Vec::new(),
        }
    }

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            interval: Duration::from_secs(60),
            failure_backoff: Duration::from_secs(5),
            on_start: true,
            watch_enabled: false,
            summarize: false,
            summary_workers: 2,
            min_section_headlines: 1,
        }
    }

    fn start(
        source: Arc<FakeSource>,
        summaries: Option<Arc<dyn SummarySource>>,
        options: SchedulerOptions,
    ) -> (SchedulerHandle, HeadlineStore, SnapshotStore, tokio::task::JoinHandle<()>) {
        let backend = Arc::new(LocalCache::new());
        let store = HeadlineStore::new(backend.clone(), &CacheConfig::default());
        let snapshots = SnapshotStore::new(backend, &HistoryConfig::default());
        let sections = vec![
            Section::new("Tech", "https://example.com/Tech"),
            Section::new("Science", "https://example.com/Science"),
        ];
        let (scheduler, handle) = RefreshScheduler::new(
            source,
            summaries,
            store.clone(),
            snapshots.clone(),
            sections,
            ExclusionFilter::default(),
            options,
        );
        let task = tokio::spawn(scheduler.run());
        (handle, store, snapshots, task)
    }

    async fn wait_cycles(handle: &SchedulerHandle, n: u64) {
        let mut cycles = handle.subscribe();
        cycles.wait_for(|done| *done >= n).await.unwrap();
    }

    fn titles(headlines: &[Headline]) -> Vec<&str> {
        headlines.iter().map(|h| h.title.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_cycle_per_interval_without_drift() {
        let source = FakeSource::new(Duration::from_secs(7), |_| {
            vec![fetched("Tech", &["Rust ships new release"])]
        });
        let (handle, _, _, _task) = start(source.clone(), None, options());
        let origin = Instant::now();

        tokio::time::sleep(Duration::from_secs(599)).await;

        let starts = source.starts();
        assert_eq!(starts.len(), 10);
        for (i, at) in starts.iter().enumerate() {
            assert_eq!(at.duration_since(origin), Duration::from_secs(60 * i as u64));
        }
        assert_eq!(handle.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_refreshing_is_coalesced() {
        let source = FakeSource::new(Duration::from_secs(5), |_| {
            vec![fetched("Tech", &["Rust ships new release"])]
        });
        let (handle, _, _, _task) = start(source.clone(), None, options());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), SchedulerState::Refreshing);
        assert_eq!(handle.trigger_refresh(), TriggerOutcome::Coalesced);

        wait_cycles(&handle, 1).await;
        assert_eq!(handle.trigger_refresh(), TriggerOutcome::Started);
        wait_cycles(&handle, 2).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.starts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_section_keeps_previous_headlines() {
        let source = FakeSource::new(Duration::from_secs(1), |cycle| match cycle {
            0 => vec![
                fetched("Tech", &["Chip demand keeps rising", "New battery chemistry unveiled"]),
                fetched("Science", &["Comet visible over Chile"]),
            ],
            _ => vec![fetched("Tech", &["Quantum startup raises funds"]), failed("Science")],
        });
        let (handle, store, _, _task) = start(source, None, options());

        wait_cycles(&handle, 1).await;
        assert_eq!(handle.trigger_refresh(), TriggerOutcome::Started);
        wait_cycles(&handle, 2).await;

        let current = handle.current_headlines();
        assert_eq!(titles(&current), vec!["Quantum startup raises funds", "Comet visible over Chile"]);
        assert!(!current[0].stale);
        assert!(current[1].stale);

        let report = handle.status().last_cycle.unwrap();
        assert!(report.committed);
        assert_eq!(
            report.sections[1].status,
            SectionStatus::PreservedPrior {
                count: 1,
                reason: "rejected with status 429".into()
            }
        );
        assert_eq!(store.load_current().await.unwrap().headlines, current);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fully_failed_cycle_writes_nothing_and_backs_off() {
        let source = FakeSource::new(Duration::from_secs(1), |_| vec![failed("Tech"), failed("Science")]);
        let (handle, store, snapshots, _task) = start(source.clone(), None, options());

        wait_cycles(&handle, 1).await;
        assert_eq!(handle.state(), SchedulerState::BackoffWait);
        assert!(handle.current_headlines().is_empty());
        assert!(store.load_current().await.is_none());
        assert!(snapshots.list(1).await.is_empty());

        // 5s, then 10s between attempts.
        wait_cycles(&handle, 3).await;
        let starts = source.starts();
        assert_eq!(starts[1] - starts[0], Duration::from_secs(6));
        assert_eq!(starts[2] - starts[1], Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_cycle_commits_nothing() {
        let source = FakeSource::new(Duration::from_secs(30), |_| {
            vec![fetched("Tech", &["Rust ships new release"])]
        });
        let (handle, store, snapshots, task) = start(source, None, options());

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(handle.state(), SchedulerState::Cancelled);
        assert_eq!(handle.trigger_refresh(), TriggerOutcome::Cancelled);
        assert!(store.load_current().await.is_none());
        assert!(snapshots.list(1).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_counts_new_headlines_after_baseline() {
        let source = FakeSource::new(Duration::from_secs(1), |cycle| match cycle {
            0 => vec![fetched("Tech", &["Chip demand keeps rising", "New battery chemistry unveiled"])],
            1 => vec![fetched(
                "Tech",
                &[
                    "Chip demand keeps rising",
                    "New battery chemistry unveiled",
                    "Quantum startup raises funds",
                    "Satellite internet expands coverage",
                ],
            )],
            _ => vec![fetched(
                "Tech",
                &[
                    "Chip demand keeps rising",
                    "New battery chemistry unveiled",
                    "Quantum startup raises funds",
                    "Satellite internet expands coverage",
                    "Ocean probe finds new vents",
                ],
            )],
        });
        let (handle, _, _, _task) = start(
            source,
            None,
            SchedulerOptions {
                watch_enabled: true,
                ..options()
            },
        );

        wait_cycles(&handle, 1).await;
        assert_eq!(handle.unseen_count(), 0);

        handle.trigger_refresh();
        wait_cycles(&handle, 2).await;
        assert_eq!(handle.unseen_count(), 2);

        handle.trigger_refresh();
        wait_cycles(&handle, 3).await;
        assert_eq!(handle.unseen_count(), 1);

        handle.acknowledge_unseen();
        assert_eq!(handle.unseen_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_attaches_summaries_and_records_snapshot() {
        let source = FakeSource::new(Duration::ZERO, |_| {
            vec![
                fetched("Tech", &["Chip demand keeps rising"]),
                fetched("Science", &["Comet visible over Chile"]),
            ]
        });
        let (handle, _, snapshots, _task) = start(
            source,
            Some(Arc::new(EchoSummaries)),
            SchedulerOptions {
                summarize: true,
                ..options()
            },
        );

        wait_cycles(&handle, 1).await;

        let current = handle.current_headlines();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].summary.as_deref(), Some("about Chip demand keeps rising"));
        assert!(current[0]
            .summary_ref
            .as_deref()
            .is_some_and(|key| key.ends_with(&current[0].fingerprint)));

        let listed = snapshots.list(1).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].headline_count, 2);
    }

    #[test]
    fn test_backoff_delay_doubles_up_to_interval() {
        let options = options();
        assert_eq!(options.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(options.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(options.backoff_delay(4), Duration::from_secs(40));
        assert_eq!(options.backoff_delay(5), Duration::from_secs(60));
        assert_eq!(options.backoff_delay(30), Duration::from_secs(60));
    }
}
