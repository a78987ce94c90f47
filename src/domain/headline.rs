use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A configured section page to scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub url: String,
}

impl Section {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A single headline as captured in one fetch.
///
/// Headlines are never edited in place: a refetch produces a new record that
/// replaces the old one inside the result set, and the `with_*`/`as_stale`
/// helpers return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub fingerprint: String,
    pub section: String,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    /// Published time as shown on the page ("3h", "10:42")
    pub published_label: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Cache key of the attached summary record
    pub summary_ref: Option<String>,
    pub summary: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
}

impl Headline {
    pub fn new(section: &str, title: &str, url: &str) -> Self {
        Self {
            fingerprint: Self::fingerprint_of(url, title),
            section: section.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            source: None,
            published_label: None,
            published_at: None,
            summary_ref: None,
            summary: None,
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    /// Deterministic identity from the normalized URL and title.
    pub fn fingerprint_of(url: &str, title: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize_url(url).as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_title(title).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn with_summary(&self, summary_ref: String, text: String) -> Self {
        Self {
            summary_ref: Some(summary_ref),
            summary: Some(text),
            ..self.clone()
        }
    }

    /// Copy flagged as carried over from an earlier cycle.
    pub fn as_stale(&self) -> Self {
        Self {
            stale: true,
            ..self.clone()
        }
    }

    /// Text searched by exclusion terms.
    pub fn haystack(&self) -> String {
        format!(
            "{} {} {} {}",
            self.title,
            self.source.as_deref().unwrap_or(""),
            self.section,
            self.url
        )
        .to_lowercase()
    }
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    without_fragment.trim_end_matches('/').to_string()
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The serialized unit stored under the primary key and in history buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineBundle {
    pub headlines: Vec<Headline>,
    pub ticker: String,
    pub captured_at: DateTime<Utc>,
}

impl HeadlineBundle {
    pub fn new(headlines: Vec<Headline>, captured_at: DateTime<Utc>) -> Self {
        let ticker = super::build_ticker_text(&headlines);
        Self {
            headlines,
            ticker,
            captured_at,
        }
    }
}
