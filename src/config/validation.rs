//! Configuration validation rules.
//!
//! Runs once after loading; a violation is fatal at construction time and
//! never re-checked per refresh cycle.

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use super::{
    Config, MIN_CACHE_TTL_SECS, MIN_HISTORY_TTL_SECS, MIN_INTERVAL_MINUTES, MIN_SUMMARY_TIMEOUT_SECS,
    MIN_TICKER_TIMEOUT_SECS,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn warn_if_raised(field: &str, value: u64, minimum: u64) {
    if value < minimum {
        tracing::warn!(field, value, minimum, "Configured value below minimum; using the minimum");
    }
}

impl Config {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for the first offending field. Durations
    /// below their minimum are not errors; their accessors raise them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        warn_if_raised("cache.ttl_secs", self.cache.ttl_secs, MIN_CACHE_TTL_SECS);
        warn_if_raised("history.ttl_secs", self.history.ttl_secs, MIN_HISTORY_TTL_SECS);
        warn_if_raised("refresh.interval_minutes", self.refresh.interval_minutes, MIN_INTERVAL_MINUTES);
        warn_if_raised("summary.timeout_secs", self.summary.timeout_secs, MIN_SUMMARY_TIMEOUT_SECS);
        warn_if_raised(
            "summary.ticker_timeout_secs",
            self.summary.ticker_timeout_secs,
            MIN_TICKER_TIMEOUT_SECS,
        );

        if self.cache.key.trim().is_empty() {
            return Err(invalid("cache.key", "must not be empty"));
        }
        if self.cache.op_timeout_ms == 0 {
            return Err(invalid("cache.op_timeout_ms", "must be greater than 0"));
        }
        if self.cache.summary_fresh_secs == 0 {
            return Err(invalid("cache.summary_fresh_secs", "must be greater than 0"));
        }
        if self.cache.summary_retention_secs < self.cache.summary_fresh_secs {
            return Err(invalid(
                "cache.summary_retention_secs",
                "must not be shorter than summary_fresh_secs",
            ));
        }
        if let Some(endpoint) = &self.cache.redis_url {
            if let Err(e) = Url::parse(endpoint) {
                return Err(invalid("cache.redis_url", e.to_string()));
            }
        }

        if self.history.prefix.trim().is_empty() {
            return Err(invalid("history.prefix", "must not be empty"));
        }

        if self.refresh.failure_backoff_secs == 0 {
            return Err(invalid("refresh.failure_backoff_secs", "must be greater than 0"));
        }
        if self.refresh.summary_workers == 0 {
            return Err(invalid("refresh.summary_workers", "must be greater than 0"));
        }

        if self.fetch.sections.is_empty() {
            return Err(invalid("fetch.sections", "at least one section is required"));
        }
        for section in &self.fetch.sections {
            if section.label.trim().is_empty() {
                return Err(invalid("fetch.sections", "section labels must not be empty"));
            }
            if let Err(e) = Url::parse(&section.url) {
                return Err(invalid(
                    "fetch.sections",
                    format!("{}: {}", section.label, e),
                ));
            }
        }
        if self.fetch.workers == 0 {
            return Err(invalid("fetch.workers", "must be greater than 0"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(invalid("fetch.timeout_secs", "must be greater than 0"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(invalid("fetch.max_attempts", "must be at least 1"));
        }
        if self.fetch.backoff_max_ms < self.fetch.backoff_base_ms {
            return Err(invalid("fetch.backoff_max_ms", "must not be below backoff_base_ms"));
        }
        if self.fetch.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(invalid("fetch.user_agents", "at least one user agent is required"));
        }

        if self.summary.article_timeout_secs == 0 {
            return Err(invalid("summary.article_timeout_secs", "must be greater than 0"));
        }
        if let Some(base) = &self.summary.api_base {
            if let Err(e) = Url::parse(base) {
                return Err(invalid("summary.api_base", e.to_string()));
            }
        }

        if self.summary.api_base.is_some() && self.summary.model.is_none() {
            tracing::warn!("summary.api_base is set without summary.model; summaries will use fallbacks");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Section;

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_values_below_minimum() {
        let mut config = Config::default();
        config.cache.ttl_secs = 30;
        config.history.ttl_secs = 10;
        config.refresh.interval_minutes = 0;
        config.summary.timeout_secs = 4;
        config.summary.ticker_timeout_secs = 2;
        assert!(config.validate().is_ok());
        assert_eq!(config.summary.timeout(), std::time::Duration::from_secs(5));
        assert_eq!(config.refresh.interval(), std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_empty_cache_key() {
        let mut config = Config::default();
        config.cache.key = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "cache.key"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_section_url() {
        let mut config = Config::default();
        config.fetch.sections = vec![Section::new("Broken", "not a url")];
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "fetch.sections"));
    }

    #[test]
    fn test_validate_rejects_bad_redis_url() {
        let mut config = Config::default();
        config.cache.redis_url = Some("::nope".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_converts_to_headwire_error() {
        let mut config = Config::default();
        config.history.prefix = String::new();
        let err: crate::app::HeadwireError = config.validate().unwrap_err().into();
        assert_eq!(err.kind(), "config_invalid");
        assert!(err.to_string().contains("history.prefix"));
    }
}
