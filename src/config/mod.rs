//! Configuration management for headwire.
//!
//! Configuration is read from `~/.config/headwire/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! Values are validated once, when the [`AppContext`](crate::app::AppContext)
//! is built; nothing re-reads or re-validates them per refresh cycle.

mod validation;

pub use validation::ConfigError;

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Section;

/// Smallest values honored for durations; lower settings are raised to these.
pub const MIN_CACHE_TTL_SECS: u64 = 60;
pub const MIN_HISTORY_TTL_SECS: u64 = 300;
pub const MIN_INTERVAL_MINUTES: u64 = 1;
pub const MIN_SUMMARY_TIMEOUT_SECS: u64 = 5;
pub const MIN_TICKER_TIMEOUT_SECS: u64 = 3;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub refresh: RefreshConfig,
    pub fetch: FetchConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Primary key holding the serialized current result set
    pub key: String,
    /// TTL of the primary key in seconds (default: 900, minimum: 60)
    pub ttl_secs: u64,
    /// Remote store endpoint; its absence selects the in-process cache
    pub redis_url: Option<String>,
    /// Per-operation timeout against the remote store in milliseconds
    pub op_timeout_ms: u64,
    /// How long summaries stay in the backend at all (default: 7 days)
    pub summary_retention_secs: u64,
    /// How long a cached summary counts as fresh (default: 1 day)
    pub summary_fresh_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: "ainews:headlines:v1".to_string(),
            ttl_secs: 900,
            redis_url: None,
            op_timeout_ms: 2000,
            summary_retention_secs: 7 * 86400,
            summary_fresh_secs: 86400,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(MIN_CACHE_TTL_SECS))
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn summary_retention(&self) -> Duration {
        Duration::from_secs(self.summary_retention_secs)
    }

    pub fn summary_fresh(&self) -> Duration {
        Duration::from_secs(self.summary_fresh_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Bucket key prefix (`<prefix>:<YYYY-MM-DD>:headlines`)
    pub prefix: String,
    /// Retention of each daily bucket in seconds (default: 86400, minimum: 300)
    pub ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "news".to_string(),
            ttl_secs: 86400,
        }
    }
}

impl HistoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(MIN_HISTORY_TTL_SECS))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Minutes between cycle starts (minimum: 1)
    pub interval_minutes: u64,
    /// Run a cycle as soon as the scheduler starts
    pub on_start: bool,
    /// Track headlines the user has not seen yet
    pub watch_enabled: bool,
    /// First delay after a fully failed cycle; doubles up to the interval
    pub failure_backoff_secs: u64,
    /// Attach ticker summaries to every headline during a cycle
    pub summarize: bool,
    /// Concurrent summary resolutions per cycle
    pub summary_workers: usize,
    /// Sections yielding fewer fresh headlines keep the previous ones
    pub min_section_headlines: usize,
    /// Headlines matching any of these terms are dropped
    pub exclusions: Vec<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            on_start: true,
            watch_enabled: false,
            failure_backoff_secs: 30,
            summarize: true,
            summary_workers: 4,
            min_section_headlines: 1,
            exclusions: Vec::new(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(MIN_INTERVAL_MINUTES).saturating_mul(60))
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub sections: Vec<Section>,
    /// Concurrent section fetches
    pub workers: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per section, first try included
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Rotated between attempts
    pub user_agents: Vec<String>,
    /// Cap on headlines kept from one section (None = everything)
    pub max_per_section: Option<usize>,
    /// Anchors with shorter titles are ignored
    pub min_title_words: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            sections: vec![
                Section::new("Tech latest", "https://www.newsnow.com/us/Tech?type=ln"),
                Section::new("Science latest", "https://www.newsnow.com/us/Science?type=ln"),
            ],
            workers: 4,
            timeout_secs: 15,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36"
                    .to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:118.0) Gecko/20100101 Firefox/118.0"
                    .to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.1 Safari/605.1.15"
                    .to_string(),
            ],
            max_per_section: None,
            min_title_words: 3,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Full article summary timeout in seconds (minimum: 5)
    pub timeout_secs: u64,
    /// Short ticker summary timeout in seconds (minimum: 3)
    pub ticker_timeout_secs: u64,
    /// Timeout for downloading the article page in seconds
    pub article_timeout_secs: u64,
    /// OpenAI-compatible endpoint, e.g. `https://api.openai.com/v1`
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// CSS selectors tried in order when extracting article text
    pub content_selectors: Vec<String>,
    /// Article text sent upstream is cut at this many characters
    pub max_article_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            ticker_timeout_secs: 8,
            article_timeout_secs: 20,
            api_base: None,
            api_key: None,
            model: None,
            content_selectors: vec![
                "article".to_string(),
                "[role='main'] article".to_string(),
                "[role='main']".to_string(),
                ".article".to_string(),
                ".post".to_string(),
                ".story".to_string(),
            ],
            max_article_chars: 12_000,
        }
    }
}

impl SummaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(MIN_SUMMARY_TIMEOUT_SECS))
    }

    pub fn ticker_timeout(&self) -> Duration {
        Duration::from_secs(self.ticker_timeout_secs.max(MIN_TICKER_TIMEOUT_SECS))
    }

    pub fn article_timeout(&self) -> Duration {
        Duration::from_secs(self.article_timeout_secs)
    }

    /// Whether enough is configured to call a provider at all.
    pub fn provider_configured(&self) -> bool {
        self.api_base.as_deref().is_some_and(|b| !b.trim().is_empty())
            && self.model.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and parse a specific file without creating anything.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/headwire/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("headwire").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# headwire configuration
#
# Every key is optional; anything left out uses the value shown here.

[cache]
key = "ainews:headlines:v1"
ttl_secs = 900
# Uncomment to share the cache through Redis. Without it an in-process
# cache is used and nothing survives a restart.
# redis_url = "redis://127.0.0.1:6379/0"
op_timeout_ms = 2000
summary_retention_secs = 604800
summary_fresh_secs = 86400

[history]
enabled = true
prefix = "news"
ttl_secs = 86400

[refresh]
interval_minutes = 5
on_start = true
watch_enabled = false
failure_backoff_secs = 30
summarize = true
summary_workers = 4
min_section_headlines = 1
exclusions = []

[fetch]
workers = 4
timeout_secs = 15
max_attempts = 3
backoff_base_ms = 500
backoff_max_ms = 8000
min_title_words = 3

[[fetch.sections]]
label = "Tech latest"
url = "https://www.newsnow.com/us/Tech?type=ln"

[[fetch.sections]]
label = "Science latest"
url = "https://www.newsnow.com/us/Science?type=ln"

[summary]
timeout_secs = 15
ticker_timeout_secs = 8
article_timeout_secs = 20
# api_base = "https://api.openai.com/v1"
# api_key = "sk-..."
# model = "gpt-4.1-mini"
max_article_chars = 12000
"##
        .to_string()
    }
}
