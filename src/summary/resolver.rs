use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::HeadwireError;
use crate::config::{CacheConfig, SummaryConfig};
use crate::domain::{Headline, SummaryIssue, SummaryKind, SummaryRecord};
use crate::store::HeadlineStore;
use crate::summary::{ArticleFetcher, SingleFlight, SummaryRequest, Summarizer};

const FALLBACK_MAX_CHARS: usize = 800;
const FALLBACK_LINES: usize = 4;

/// Text shown when no real summary could be produced.
///
/// With article text: its first four lines, cut at 800 characters.
/// Without: the title plus a pointer to the full article.
pub fn fallback_text(title: &str, article_text: Option<&str>) -> String {
    if let Some(text) = article_text.map(str::trim).filter(|t| !t.is_empty()) {
        let excerpt = text.lines().take(FALLBACK_LINES).collect::<Vec<_>>().join("\n\n");
        if excerpt.chars().count() > FALLBACK_MAX_CHARS {
            let cut: String = excerpt.chars().take(FALLBACK_MAX_CHARS).collect();
            return format!("{}…", cut.trim_end());
        }
        if !excerpt.trim().is_empty() {
            return excerpt;
        }
        return title.to_string();
    }
    format!("{}\n\nSummary unavailable right now. Open the full article for details.", title)
}

struct ResolverInner {
    store: HeadlineStore,
    summarizer: Option<Arc<dyn Summarizer>>,
    articles: ArticleFetcher,
    summary_timeout: Duration,
    ticker_timeout: Duration,
    fresh_for: Duration,
}

/// Cache-first summary resolution with at most one upstream call per
/// fingerprint and kind in flight.
///
/// `resolve` never fails: timeouts, provider errors and missing
/// configuration all produce a fallback record (`is_fallback = true`).
/// Fallbacks are returned but never written to the cache.
#[derive(Clone)]
pub struct SummaryResolver {
    inner: Arc<ResolverInner>,
    flights: Arc<SingleFlight<SummaryRecord>>,
}

impl SummaryResolver {
    pub fn new(
        store: HeadlineStore,
        summarizer: Option<Arc<dyn Summarizer>>,
        articles: ArticleFetcher,
        summary: &SummaryConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                store,
                summarizer,
                articles,
                summary_timeout: summary.timeout(),
                ticker_timeout: summary.ticker_timeout(),
                fresh_for: cache.summary_fresh(),
            }),
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub fn summary_key(&self, fingerprint: &str, kind: SummaryKind) -> String {
        self.inner.store.summary_key(fingerprint, kind)
    }

    pub async fn resolve(&self, headline: &Headline, kind: SummaryKind) -> SummaryRecord {
        if let Some(record) = self.inner.cached_fresh(&headline.fingerprint, kind).await {
            debug!(fingerprint = %headline.fingerprint, %kind, "Summary cache hit");
            return record;
        }

        let key = format!("{}:{}", kind, headline.fingerprint);
        let inner = self.inner.clone();
        let headline = headline.clone();
        self.flights
            .run(&key, move || async move { inner.resolve_uncached(headline, kind).await })
            .await
    }

    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }
}

impl ResolverInner {
    async fn cached_fresh(&self, fingerprint: &str, kind: SummaryKind) -> Option<SummaryRecord> {
        self.store
            .load_summary(fingerprint, kind)
            .await
            .filter(|record| !record.is_fallback && record.is_fresh(Utc::now(), self.fresh_for))
    }

    async fn resolve_uncached(&self, headline: Headline, kind: SummaryKind) -> SummaryRecord {
        // A flight that finished between our cache miss and joining may have stored it.
        if let Some(record) = self.cached_fresh(&headline.fingerprint, kind).await {
            return record;
        }

        let Some(summarizer) = self.summarizer.clone() else {
            return self
                .fallback(&headline, kind, None, SummaryIssue::ProviderUnconfigured)
                .await;
        };

        let article_text = match kind {
            SummaryKind::Article => match self.articles.fetch_text(&headline.url).await {
                Some(text) => Some(text),
                None => {
                    return self
                        .fallback(&headline, kind, None, SummaryIssue::ArticleFetchFailed)
                        .await
                }
            },
            SummaryKind::Ticker => None,
        };

        let request = SummaryRequest {
            kind,
            title: headline.title.clone(),
            url: headline.url.clone(),
            source: headline.source.clone(),
            article_text,
        };
        let limit = match kind {
            SummaryKind::Article => self.summary_timeout,
            SummaryKind::Ticker => self.ticker_timeout,
        };

        match tokio::time::timeout(limit, summarizer.summarize(&request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                let record = SummaryRecord {
                    fingerprint: headline.fingerprint.clone(),
                    kind,
                    text: text.trim().to_string(),
                    model: summarizer.model().map(str::to_string),
                    created_at: Utc::now(),
                    is_fallback: false,
                    issue: None,
                };
                if !self.store.save_summary(&record).await {
                    debug!(fingerprint = %record.fingerprint, "Summary not cached; backend refused write");
                }
                info!(fingerprint = %record.fingerprint, %kind, "Summary generated");
                record
            }
            Ok(Ok(_)) => {
                self.fallback(&headline, kind, request.article_text.as_deref(), SummaryIssue::EmptySummary)
                    .await
            }
            Ok(Err(e)) => {
                warn!(url = %headline.url, %kind, error = %e, "Summary provider failed");
                self.fallback(&headline, kind, request.article_text.as_deref(), SummaryIssue::ProviderError)
                    .await
            }
            Err(_) => {
                let error = HeadwireError::ProviderTimeout(limit.as_secs());
                warn!(url = %headline.url, %kind, %error, "Summary fell back");
                self.fallback(&headline, kind, request.article_text.as_deref(), SummaryIssue::ProviderTimeout)
                    .await
            }
        }
    }

    /// Best degraded answer: any earlier real summary, however old, else text
    /// built from the headline and article.
    async fn fallback(
        &self,
        headline: &Headline,
        kind: SummaryKind,
        article_text: Option<&str>,
        issue: SummaryIssue,
    ) -> SummaryRecord {
        if let Some(previous) = self
            .store
            .load_summary(&headline.fingerprint, kind)
            .await
            .filter(|record| !record.is_fallback)
        {
            return SummaryRecord {
                is_fallback: true,
                issue: Some(issue),
                ..previous
            };
        }

        SummaryRecord::fallback(
            &headline.fingerprint,
            kind,
            fallback_text(&headline.title, article_text),
            issue,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Result;
    use crate::cache::LocalCache;
    use crate::config::FetchConfig;
    use crate::fetcher::retry::tests::ScriptedFetcher;
    use crate::fetcher::{RetryPolicy, UserAgentPool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and answers after `delay`; fails when `fail` is set.
    struct CountingSummarizer {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingSummarizer {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        fn model(&self) -> Option<&str> {
            Some("test-model")
        }

        async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(HeadwireError::Provider("boom".into()));
            }
            Ok(format!("- {} (call {})", request.title, n))
        }
    }

    fn resolver(summarizer: Option<Arc<dyn Summarizer>>, article_script: Vec<Result<crate::fetcher::FetchResponse>>) -> (SummaryResolver, HeadlineStore) {
        let store = HeadlineStore::new(Arc::new(LocalCache::new()), &CacheConfig::default());
        let fetch = FetchConfig::default();
        let articles = ArticleFetcher::new(
            Arc::new(ScriptedFetcher::new(article_script)),
            Arc::new(UserAgentPool::new(&fetch.user_agents)),
            RetryPolicy::from_config(&fetch),
            &SummaryConfig::default(),
        );
        let resolver = SummaryResolver::new(
            store.clone(),
            summarizer,
            articles,
            &SummaryConfig::default(),
            &CacheConfig::default(),
        );
        (resolver, store)
    }

    fn headline() -> Headline {
        Headline::new("Tech", "Chipmakers race to build accelerators", "https://example.com/chips")
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolves_make_one_upstream_call() {
        let summarizer = CountingSummarizer::new(Duration::from_millis(200), false);
        let (resolver, _) = resolver(Some(summarizer.clone()), Vec::new());
        let h = headline();

        let calls = (0..10).map(|_| {
            let resolver = resolver.clone();
            let h = h.clone();
            tokio::spawn(async move { resolver.resolve(&h, SummaryKind::Ticker).await })
        });
        let records: Vec<SummaryRecord> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(records.iter().all(|r| r == &records[0]));
        assert!(!records[0].is_fallback);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cached_resolve_is_idempotent() {
        let summarizer = CountingSummarizer::new(Duration::ZERO, false);
        let (resolver, _) = resolver(Some(summarizer.clone()), Vec::new());
        let h = headline();

        let first = resolver.resolve(&h, SummaryKind::Ticker).await;
        let second = resolver.resolve(&h, SummaryKind::Ticker).await;

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_prefers_stale_cached_summary() {
        let summarizer = CountingSummarizer::new(Duration::from_secs(60), false);
        let (resolver, store) = resolver(Some(summarizer), Vec::new());
        let h = headline();
        let old = SummaryRecord {
            fingerprint: h.fingerprint.clone(),
            kind: SummaryKind::Ticker,
            text: "old but real".into(),
            model: Some("test-model".into()),
            created_at: Utc::now() - chrono::Duration::days(3),
            is_fallback: false,
            issue: None,
        };
        store.save_summary(&old).await;

        let record = resolver.resolve(&h, SummaryKind::Ticker).await;

        assert!(record.is_fallback);
        assert_eq!(record.text, "old but real");
        assert_eq!(record.issue, Some(SummaryIssue::ProviderTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_and_article_use_separate_timeouts() {
        let summarizer = CountingSummarizer::new(Duration::from_secs(10), false);
        let page = "<html><body><p>The new accelerator doubles throughput for inference.</p></body></html>";
        let (resolver, _) = resolver(Some(summarizer.clone()), vec![ScriptedFetcher::ok(page)]);
        let h = headline();

        let ticker = resolver.resolve(&h, SummaryKind::Ticker).await;
        assert!(ticker.is_fallback);
        assert_eq!(ticker.issue, Some(SummaryIssue::ProviderTimeout));

        let article = resolver.resolve(&h, SummaryKind::Article).await;
        assert!(!article.is_fallback);
        assert!(article.issue.is_none());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_error_builds_title_fallback_and_skips_cache() {
        let summarizer = CountingSummarizer::new(Duration::ZERO, true);
        let (resolver, store) = resolver(Some(summarizer), Vec::new());
        let h = headline();

        let record = resolver.resolve(&h, SummaryKind::Ticker).await;

        assert!(record.is_fallback);
        assert_eq!(record.issue, Some(SummaryIssue::ProviderError));
        assert!(record.text.starts_with("Chipmakers race to build accelerators\n\n"));
        assert!(store.load_summary(&h.fingerprint, SummaryKind::Ticker).await.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_falls_back() {
        let (resolver, _) = resolver(None, Vec::new());
        let record = resolver.resolve(&headline(), SummaryKind::Article).await;
        assert!(record.is_fallback);
        assert_eq!(record.issue, Some(SummaryIssue::ProviderUnconfigured));
    }

    #[tokio::test(start_paused = true)]
    async fn test_article_fetch_failure_falls_back() {
        let summarizer = CountingSummarizer::new(Duration::ZERO, false);
        let (resolver, _) = resolver(
            Some(summarizer.clone()),
            vec![Err(HeadwireError::HttpStatus {
                status: 404,
                url: "https://example.com/chips".into(),
            })],
        );
        let record = resolver.resolve(&headline(), SummaryKind::Article).await;
        assert_eq!(record.issue, Some(SummaryIssue::ArticleFetchFailed));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_article_summary_uses_page_text() {
        let summarizer = CountingSummarizer::new(Duration::ZERO, false);
        let page = "<html><body><p>The new accelerator doubles throughput for inference.</p></body></html>";
        let (resolver, store) = resolver(Some(summarizer), vec![ScriptedFetcher::ok(page)]);
        let h = headline();

        let record = resolver.resolve(&h, SummaryKind::Article).await;

        assert!(!record.is_fallback);
        assert_eq!(record.model.as_deref(), Some("test-model"));
        assert_eq!(store.load_summary(&h.fingerprint, SummaryKind::Article).await, Some(record));
    }

    #[test]
    fn test_fallback_text_variants() {
        assert_eq!(
            fallback_text("Title here", None),
            "Title here\n\nSummary unavailable right now. Open the full article for details."
        );
        assert_eq!(fallback_text("T", Some("one\ntwo\nthree\nfour\nfive")), "one\n\ntwo\n\nthree\n\nfour");
        let long = "x".repeat(2000);
        let text = fallback_text("T", Some(&long));
        assert!(text.ends_with('…'));
        assert_eq!(text.chars().count(), FALLBACK_MAX_CHARS + 1);
    }
}
