pub mod http_fetcher;
pub mod parallel;
pub mod retry;

pub use http_fetcher::HttpFetcher;
pub use parallel::{FetchPipeline, FetchReport, SectionResult, SectionStatus};
pub use retry::{fetch_with_retry, RetryOutcome, RetryPolicy, UserAgentPool};

use async_trait::async_trait;

use crate::app::Result;

/// One HTTP GET as the retry loop wants it sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub user_agent: String,
    /// Extra headers on top of the client defaults
    pub headers: Vec<(&'static str, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: String,
    /// URL after redirects
    pub final_url: String,
}

/// Performs a single request. Implementations classify failures into the
/// error taxonomy so the retry loop can decide what to repeat.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}
