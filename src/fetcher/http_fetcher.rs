use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};

use crate::app::{HeadwireError, Result};
use crate::fetcher::{FetchRequest, FetchResponse, Fetcher};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        defaults.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .default_headers(defaults)
            .build()?;

        Ok(Self { client })
    }
}

/// Map a non-success status onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, url: &str) -> HeadwireError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => HeadwireError::NetworkRejected {
            status: status.as_u16(),
        },
        StatusCode::REQUEST_TIMEOUT => HeadwireError::NetworkTransient(format!("{} from {}", status, url)),
        s if s.is_server_error() => HeadwireError::NetworkTransient(format!("{} from {}", status, url)),
        _ => HeadwireError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        },
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&request.user_agent) {
            headers.insert(USER_AGENT, value);
        }

        for (name, value) in &request.headers {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        let response = self
            .client
            .get(&request.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    HeadwireError::NetworkTransient(e.to_string())
                } else {
                    HeadwireError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &request.url));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| HeadwireError::NetworkTransient(e.to_string()))?;

        Ok(FetchResponse { body, final_url })
    }
}
