use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::SummaryConfig;
use crate::fetcher::{fetch_with_retry, Fetcher, RetryPolicy, UserAgentPool};

const MIN_PARAGRAPH_WORDS: usize = 5;
/// A content selector only wins when it yields more words than this
const MIN_SELECTOR_WORDS: usize = 60;

/// Pulls readable paragraph text out of an article page.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    content_selectors: Vec<Selector>,
    max_chars: usize,
}

impl ArticleExtractor {
    pub fn new(config: &SummaryConfig) -> Self {
        let content_selectors = config
            .content_selectors
            .iter()
            .filter_map(|css| match Selector::parse(css) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!(selector = %css, error = %e, "Skipping invalid content selector");
                    None
                }
            })
            .collect();
        Self {
            content_selectors,
            max_chars: config.max_article_chars,
        }
    }

    /// Paragraphs of the first content selector with enough text, else every
    /// `<p>` in the document. Joined by blank lines and cut to `max_chars`.
    pub fn extract(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let paragraph = Selector::parse("p, li").expect("static selector");

        let from_selector = self.content_selectors.iter().find_map(|selector| {
            let node = document.select(selector).next()?;
            let text = collect_paragraphs(node, &paragraph);
            (text.split_whitespace().count() > MIN_SELECTOR_WORDS).then_some(text)
        });

        let text = from_selector.unwrap_or_else(|| {
            let only_p = Selector::parse("p").expect("static selector");
            collect_paragraphs(document.root_element(), &only_p)
        });

        truncate_chars(&text, self.max_chars)
    }
}

fn collect_paragraphs(node: ElementRef<'_>, selector: &Selector) -> String {
    node.select(selector)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| text.split_whitespace().count() >= MIN_PARAGRAPH_WORDS)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Downloads an article page and extracts its text, bounded by one timeout
/// covering every retry.
pub struct ArticleFetcher {
    fetcher: Arc<dyn Fetcher>,
    agents: Arc<UserAgentPool>,
    policy: RetryPolicy,
    extractor: ArticleExtractor,
    timeout: Duration,
}

impl ArticleFetcher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        agents: Arc<UserAgentPool>,
        policy: RetryPolicy,
        config: &SummaryConfig,
    ) -> Self {
        Self {
            fetcher,
            agents,
            policy,
            extractor: ArticleExtractor::new(config),
            timeout: config.article_timeout(),
        }
    }

    /// Article text, or `None` when the page could not be fetched or had no text.
    pub async fn fetch_text(&self, url: &str) -> Option<String> {
        let download = fetch_with_retry(self.fetcher.as_ref(), url, Some(url), &self.policy, &self.agents);
        let outcome = match tokio::time::timeout(self.timeout, download).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(url, "Article fetch timed out");
                return None;
            }
        };

        match outcome.result {
            Ok(response) => {
                let text = self.extractor.extract(&response.body);
                if text.trim().is_empty() {
                    debug!(url, final_url = %response.final_url, "Article page had no extractable text");
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!(url, attempts = outcome.attempts, error = %e, "Article fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_paragraph(seed: &str) -> String {
        format!("<p>{}</p>", format!("{} word ", seed).repeat(40))
    }

    #[test]
    fn test_prefers_article_element() {
        let html = format!(
            "<html><body><nav><p>Home About Contact Jobs Press</p></nav><article>{}{}</article><p>Footer text with enough words here</p></body></html>",
            long_paragraph("alpha"),
            long_paragraph("beta")
        );
        let text = ArticleExtractor::new(&SummaryConfig::default()).extract(&html);
        assert!(text.starts_with("alpha word"));
        assert!(text.contains("\n\nbeta word"));
        assert!(!text.contains("Footer"));
    }

    #[test]
    fn test_falls_back_to_document_paragraphs() {
        let html = "<html><body><div><p>Short one</p><p>This paragraph has more than five words.</p></div></body></html>";
        let text = ArticleExtractor::new(&SummaryConfig::default()).extract(html);
        assert_eq!(text, "This paragraph has more than five words.");
    }

    #[test]
    fn test_truncates_to_max_chars() {
        let config = SummaryConfig {
            max_article_chars: 20,
            ..Default::default()
        };
        let html = format!("<html><body>{}</body></html>", long_paragraph("gamma"));
        let text = ArticleExtractor::new(&config).extract(&html);
        assert_eq!(text.chars().count(), 20);
    }

    #[test]
    fn test_invalid_selectors_are_skipped() {
        let config = SummaryConfig {
            content_selectors: vec!["[[[".into(), "article".into()],
            ..Default::default()
        };
        let extractor = ArticleExtractor::new(&config);
        assert_eq!(extractor.content_selectors.len(), 1);
    }
}
