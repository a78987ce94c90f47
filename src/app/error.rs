use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeadwireError {
    /// Timeouts, connection resets and 5xx answers. Retried.
    #[error("Transient network error: {0}")]
    NetworkTransient(String),

    /// 403/429 answers. Retried with user-agent rotation, then given up.
    #[error("Request rejected with status {status}")]
    NetworkRejected { status: u16 },

    #[error("Unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Summary provider error: {0}")]
    Provider(String),

    #[error("Summary provider timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl HeadwireError {
    /// Whether the fetch pipeline should try the same request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            HeadwireError::NetworkTransient(_) | HeadwireError::NetworkRejected { .. } => true,
            HeadwireError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Short tag used in logs and fallback summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            HeadwireError::NetworkTransient(_) | HeadwireError::Http(_) => "network_transient",
            HeadwireError::NetworkRejected { .. } => "network_rejected",
            HeadwireError::HttpStatus { .. } => "http_status",
            HeadwireError::Provider(_) => "provider_error",
            HeadwireError::ProviderTimeout(_) => "provider_timeout",
            HeadwireError::BackendUnavailable(_) => "backend_unavailable",
            HeadwireError::ConfigInvalid(_) => "config_invalid",
            HeadwireError::Json(_) => "serialization",
            HeadwireError::InvalidUrl(_) => "invalid_url",
            HeadwireError::Io(_) => "io",
            HeadwireError::Other(_) => "other",
        }
    }
}

impl From<crate::config::ConfigError> for HeadwireError {
    fn from(err: crate::config::ConfigError) -> Self {
        HeadwireError::ConfigInvalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HeadwireError>;
