use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two places a summary is requested from. Each has its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Short summary from the title alone, attached during refresh cycles
    Ticker,
    /// Full summary from the downloaded article text
    Article,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Ticker => "ticker",
            SummaryKind::Article => "article",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a fallback record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryIssue {
    ProviderTimeout,
    ProviderError,
    ProviderUnconfigured,
    ArticleFetchFailed,
    EmptySummary,
}

impl SummaryIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryIssue::ProviderTimeout => "provider_timeout",
            SummaryIssue::ProviderError => "provider_error",
            SummaryIssue::ProviderUnconfigured => "provider_unconfigured",
            SummaryIssue::ArticleFetchFailed => "article_fetch_failed",
            SummaryIssue::EmptySummary => "empty_summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub fingerprint: String,
    pub kind: SummaryKind,
    pub text: String,
    /// Provider model identifier; `None` for locally built fallbacks
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_fallback: bool,
    #[serde(default)]
    pub issue: Option<SummaryIssue>,
}

impl SummaryRecord {
    pub fn fallback(
        fingerprint: &str,
        kind: SummaryKind,
        text: String,
        issue: SummaryIssue,
    ) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            kind,
            text,
            model: None,
            created_at: Utc::now(),
            is_fallback: true,
            issue: Some(issue),
        }
    }

    /// Whether the record is younger than `fresh_for`.
    pub fn is_fresh(&self, now: DateTime<Utc>, fresh_for: std::time::Duration) -> bool {
        match chrono::Duration::from_std(fresh_for) {
            Ok(window) => now.signed_duration_since(self.created_at) < window,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_freshness_window() {
        let mut record = SummaryRecord::fallback("fp", SummaryKind::Ticker, "t".into(), SummaryIssue::ProviderError);
        let now = Utc::now();
        record.created_at = now - chrono::Duration::hours(2);
        assert!(record.is_fresh(now, Duration::from_secs(3 * 3600)));
        assert!(!record.is_fresh(now, Duration::from_secs(3600)));
    }

    #[test]
    fn test_kind_and_issue_serialize_snake_case() {
        let record = SummaryRecord::fallback("fp", SummaryKind::Article, "t".into(), SummaryIssue::ProviderTimeout);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"article\""));
        assert!(json.contains("\"provider_timeout\""));
    }
}
