//! # Headwire
//!
//! A headline cache with a resilient retrieval pipeline: section pages are
//! fetched under rate limiting, normalized into headlines, summarized through
//! an LLM provider and kept available through outages of any of them.
//!
//! ## Architecture
//!
//! ```text
//! RefreshScheduler → FetchPipeline → Normalizer → SummaryResolver → HeadlineStore / SnapshotStore
//!                                                                          │
//!                                                             CacheBackend (Redis | local)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # One refresh cycle
//! headwire refresh
//!
//! # Keep refreshing on the configured interval
//! headwire run
//!
//! # Backend health and cached payload
//! headwire stats
//!
//! # Retained daily snapshots
//! headwire history --days 3
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cache`]: Cache backends (Redis, in-process)
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration and validation
//! - [`diagnostics`]: Backend statistics
//! - [`domain`]: Headlines, summaries, snapshots
//! - [`fetcher`]: HTTP fetching with retry and user-agent rotation
//! - [`normalizer`]: Section page parsing
//! - [`scheduler`]: Periodic refresh and the unseen-headline watch
//! - [`store`]: Primary key and dated snapshot buckets
//! - [`summary`]: Summary resolution with single-flight and fallbacks

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components
/// and exposes the operations a UI calls.
pub mod app;

/// Key/value cache with TTL.
///
/// - [`CacheBackend`](cache::CacheBackend): async trait shared by both variants
/// - [`RedisCache`](cache::RedisCache): remote store, degrades to absent reads when down
/// - [`LocalCache`](cache::LocalCache): in-process fallback with expire-on-read
pub mod cache;

/// Command-line interface using clap.
///
/// - `refresh` - Run one cycle
/// - `run` - Refresh until Ctrl-C
/// - `stats [--json]` - Backend statistics
/// - `history [--days N] [--date D]` - Snapshots
/// - `clear` - Remove everything cached
/// - `summary <url>` - Summarize one article
pub mod cli;

/// Configuration loaded from `~/.config/headwire/config.toml`.
pub mod config;

pub mod diagnostics;

/// Core domain models.
///
/// - [`Headline`](domain::Headline): one headline with a SHA-256 fingerprint
/// - [`SummaryRecord`](domain::SummaryRecord): real or fallback summary
/// - [`RedisStatistics`](domain::RedisStatistics): diagnostics report
pub mod domain;

/// HTTP fetching with retry, backoff and user-agent rotation.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for a single request
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
/// - [`FetchPipeline`](fetcher::FetchPipeline): concurrent section fetching with a semaphore
pub mod fetcher;

/// Section page parsing into [`Headline`](domain::Headline)s.
pub mod normalizer;

pub mod scheduler;

/// Cache-backed stores.
///
/// - [`HeadlineStore`](store::HeadlineStore): current result set and summaries
/// - [`SnapshotStore`](store::SnapshotStore): one bucket per calendar day
pub mod store;

pub mod summary;
