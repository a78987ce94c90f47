//! Summary acquisition.
//!
//! ```text
//! Headline → cache lookup → single-flight → (article fetch) → Summarizer → cache
//!                                   └── timeout / error → fallback record
//! ```
//!
//! - [`Summarizer`]: one upstream call, implemented by [`LlmSummarizer`]
//! - [`SummaryResolver`]: cache-first, deduplicated, timeout-bounded resolution
//! - [`ArticleFetcher`]: downloads and extracts article text for full summaries

mod article;
mod flight;
mod llm;
mod resolver;

pub use article::{ArticleExtractor, ArticleFetcher};
pub use flight::SingleFlight;
pub use llm::LlmSummarizer;
pub use resolver::{fallback_text, SummaryResolver};

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::SummaryKind;

/// Everything an upstream summarizer gets to see about one headline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub kind: SummaryKind,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    /// Present for article summaries only
    pub article_text: Option<String>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Identifier recorded on successful summaries.
    fn model(&self) -> Option<&str>;

    async fn summarize(&self, request: &SummaryRequest) -> Result<String>;
}
