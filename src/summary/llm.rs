use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::app::{HeadwireError, Result};
use crate::config::SummaryConfig;
use crate::domain::SummaryKind;
use crate::summary::{SummaryRequest, Summarizer};

const ARTICLE_PROMPT: &str = "Summarize incoming news articles accurately. \
    Respond with important concise bullet points followed by a final line labelled 'Takeaway:'. \
    Do not invent facts and avoid marketing language.";

const TICKER_PROMPT: &str = "Summarize the news headline in one short sentence for a scrolling ticker. \
    Do not invent facts and avoid marketing language.";

const TEMPERATURE: f32 = 0.2;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<Value>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct LlmSummarizer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl LlmSummarizer {
    /// `None` when no endpoint or model is configured.
    pub fn from_config(config: &SummaryConfig) -> Result<Option<Self>> {
        if !config.provider_configured() {
            return Ok(None);
        }
        let (Some(base), Some(model)) = (config.api_base.as_deref(), config.model.as_deref()) else {
            return Ok(None);
        };

        // The resolver enforces the per-kind timeouts; this only stops a hung socket.
        let client = Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()?;

        Ok(Some(Self {
            client,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
        }))
    }

    fn messages(request: &SummaryRequest) -> Vec<ChatMessage<'static>> {
        match request.kind {
            SummaryKind::Article => vec![
                ChatMessage {
                    role: "system",
                    content: ARTICLE_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Title: {}\n\nArticle:\n{}",
                        request.title,
                        request.article_text.as_deref().unwrap_or_default()
                    ),
                },
            ],
            SummaryKind::Ticker => vec![
                ChatMessage {
                    role: "system",
                    content: TICKER_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: match &request.source {
                        Some(source) => format!("Title: {}\nSource: {}", request.title, source),
                        None => format!("Title: {}", request.title),
                    },
                },
            ],
        }
    }
}

/// Message content is either a plain string or a list of `{type, text}` parts.
fn content_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::messages(request),
            temperature: TEMPERATURE,
        };

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        debug!(model = %self.model, kind = %request.kind, url = %request.url, "Requesting summary");
        let response = call
            .send()
            .await
            .map_err(|e| HeadwireError::Provider(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HeadwireError::Provider("rate limited (429)".to_string()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let snippet: String = detail.chars().take(200).collect();
            return Err(HeadwireError::Provider(format!("status {}: {}", status, snippet)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| HeadwireError::Provider(format!("unreadable response: {}", e)))?;

        Ok(parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .and_then(content_text)
            .unwrap_or_default())
    }
}
