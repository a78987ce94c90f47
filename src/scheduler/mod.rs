//! Periodic refresh orchestration.
//!
//! ```text
//!            timer / trigger                 commit ok
//!   Idle ─────────────────────▶ Refreshing ───────────▶ Idle
//!     ▲                           │   │
//!     │        timer / trigger    │   └── no section fetched ──▶ BackoffWait
//!     └──────── BackoffWait ◀─────┘
//!                        shutdown from any state ──▶ Cancelled
//! ```
//!
//! The scheduler only talks to its collaborators through the
//! [`HeadlineSource`] and [`SummarySource`] capabilities, so tests can
//! substitute either side.

mod runner;

pub use runner::{RefreshScheduler, SchedulerOptions};

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::domain::{Headline, Section, SummaryKind, SummaryRecord};
use crate::fetcher::{FetchPipeline, FetchReport, SectionStatus};
use crate::summary::SummaryResolver;

/// Produces the per-section fetch results for one cycle.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn fetch_sections(&self, sections: &[Section]) -> FetchReport;
}

#[async_trait]
impl HeadlineSource for FetchPipeline {
    async fn fetch_sections(&self, sections: &[Section]) -> FetchReport {
        FetchPipeline::fetch_sections(self, sections).await
    }
}

/// Attaches ticker summaries during a cycle.
#[async_trait]
pub trait SummarySource: Send + Sync {
    fn summary_key(&self, fingerprint: &str) -> String;

    async fn ticker_summary(&self, headline: &Headline) -> SummaryRecord;
}

#[async_trait]
impl SummarySource for SummaryResolver {
    fn summary_key(&self, fingerprint: &str) -> String {
        SummaryResolver::summary_key(self, fingerprint, SummaryKind::Ticker)
    }

    async fn ticker_summary(&self, headline: &Headline) -> SummaryRecord {
        self.resolve(headline, SummaryKind::Ticker).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Refreshing,
    BackoffWait,
    Cancelled,
}

/// What happened to a manual refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The countdown was cut short; a cycle starts now
    Started,
    /// A cycle is already running or queued; nothing new was scheduled
    Coalesced,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionOutcome {
    pub label: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: SectionStatus,
}

/// Summary of one finished cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sections: Vec<SectionOutcome>,
    pub committed: bool,
    pub headline_count: usize,
    /// Headlines not present in the previous cycle (0 while the watch is off)
    pub new_unseen: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub next_run: Option<DateTime<Utc>>,
    pub unseen: usize,
    pub last_cycle: Option<CycleReport>,
}

struct SharedState {
    state: SchedulerState,
    current: Vec<Headline>,
    unseen: usize,
    next_run: Option<DateTime<Utc>>,
    last_cycle: Option<CycleReport>,
}

/// State readable by handles while the scheduler task owns the cycle.
pub(crate) struct Shared {
    inner: Mutex<SharedState>,
    cycles: watch::Sender<u64>,
}

impl Shared {
    fn new() -> Self {
        let (cycles, _) = watch::channel(0);
        Self {
            inner: Mutex::new(SharedState {
                state: SchedulerState::Idle,
                current: Vec::new(),
                unseen: 0,
                next_run: None,
                last_cycle: None,
            }),
            cycles,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> SchedulerState {
        self.lock().state
    }

    fn set_state(&self, state: SchedulerState) {
        self.lock().state = state;
    }

    fn set_next_run(&self, next_run: Option<DateTime<Utc>>) {
        self.lock().next_run = next_run;
    }

    fn current(&self) -> Vec<Headline> {
        self.lock().current.clone()
    }

    /// Swap in a committed result set along with its count of new headlines.
    fn replace_current(&self, headlines: Vec<Headline>, new_unseen: usize) {
        let mut inner = self.lock();
        inner.current = headlines;
        inner.unseen = new_unseen;
    }

    fn finish_cycle(&self, report: CycleReport) {
        self.lock().last_cycle = Some(report);
        self.cycles.send_modify(|n| *n += 1);
    }
}

/// Cloneable control surface for a running [`RefreshScheduler`].
///
/// Dropping every handle stops the scheduler at its next wait point.
#[derive(Clone)]
pub struct SchedulerHandle {
    triggers: mpsc::Sender<()>,
    shutdown: Arc<watch::Sender<bool>>,
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Start a cycle now unless one is already running or queued.
    pub fn trigger_refresh(&self) -> TriggerOutcome {
        match self.shared.state() {
            SchedulerState::Cancelled => TriggerOutcome::Cancelled,
            SchedulerState::Refreshing => TriggerOutcome::Coalesced,
            SchedulerState::Idle | SchedulerState::BackoffWait => match self.triggers.try_send(()) {
                Ok(()) => TriggerOutcome::Started,
                Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::Coalesced,
                Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Cancelled,
            },
        }
    }

    /// The last committed result set, in display order.
    pub fn current_headlines(&self) -> Vec<Headline> {
        self.shared.current()
    }

    pub fn unseen_count(&self) -> usize {
        self.shared.lock().unseen
    }

    /// Reset the unseen counter once the user has looked at the headlines.
    pub fn acknowledge_unseen(&self) {
        self.shared.lock().unseen = 0;
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.shared.lock();
        SchedulerStatus {
            state: inner.state,
            next_run: inner.next_run,
            unseen: inner.unseen,
            last_cycle: inner.last_cycle.clone(),
        }
    }

    /// Receiver whose value counts finished cycles.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.cycles.subscribe()
    }

    /// Ask the scheduler to stop. An in-flight cycle is abandoned uncommitted.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
