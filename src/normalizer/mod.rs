//! Section page parsing.
//!
//! Turns a section's HTML into ordered [`Headline`]s and mixes several
//! sections into one round-robin sequence. Output depends only on the input
//! bytes, so identical pages always yield identical headline lists.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::app::Result;
use crate::config::FetchConfig;
use crate::domain::{Headline, Section};

const CONTAINER_SELECTORS: &[&str] = &["#newsfeed", "div.newsfeed", "main", "#main", "body"];

const ANCHOR_SELECTORS: &[&str] = &[
    "a.newsfeed__title-link",
    "a.nn-feed-item__title-link",
    "div.newsfeed a",
    "#newsfeed a",
    "article a",
];

const CUTOFF_TOKENS: &[&str] = &["more topics", "more news", "more stories"];
const CUTOFF_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "header"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn is_cutoff(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    !lowered.is_empty() && CUTOFF_TOKENS.iter().any(|token| lowered.contains(token))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    min_title_words: usize,
    max_per_section: Option<usize>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            min_title_words: config.min_title_words,
            max_per_section: config.max_per_section,
        }
    }

    /// Parse one section page into headlines, in page order, without duplicates.
    pub fn normalize(&self, section: &Section, body: &str) -> Result<Vec<Headline>> {
        let base = Url::parse(&section.url)?;
        let document = Html::parse_document(body);
        let fetched_at = Utc::now();

        let container = CONTAINER_SELECTORS
            .iter()
            .find_map(|css| document.select(&selector(css)).next())
            .unwrap_or_else(|| document.root_element());

        let candidates: HashSet<_> = ANCHOR_SELECTORS
            .iter()
            .flat_map(|css| {
                let sel = selector(css);
                container.select(&sel).map(|el| el.id()).collect::<Vec<_>>()
            })
            .collect();
        let restrict = !candidates.is_empty();

        let mut seen = HashSet::new();
        let mut headlines = Vec::new();

        for node in container.descendants() {
            match node.value() {
                Node::Text(text) => {
                    if is_cutoff(text) {
                        break;
                    }
                }
                Node::Element(element) => {
                    if CUTOFF_TAGS.contains(&element.name()) {
                        if let Some(el) = ElementRef::wrap(node) {
                            if is_cutoff(&el.text().collect::<Vec<_>>().join(" ")) {
                                break;
                            }
                        }
                    }
                    if element.name() != "a" || (restrict && !candidates.contains(&node.id())) {
                        continue;
                    }
                    let Some(anchor) = ElementRef::wrap(node) else {
                        continue;
                    };
                    let Some(mut headline) = self.headline_from_anchor(section, &base, anchor) else {
                        continue;
                    };
                    if !seen.insert(headline.fingerprint.clone()) {
                        continue;
                    }
                    headline.fetched_at = fetched_at;
                    headlines.push(headline);
                    if self.max_per_section.is_some_and(|max| headlines.len() >= max) {
                        break;
                    }
                }
                _ => {}
            }
        }

        Ok(headlines)
    }

    fn headline_from_anchor(&self, section: &Section, base: &Url, anchor: ElementRef<'_>) -> Option<Headline> {
        let raw_title = collapse_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));
        let title = decode_html_entities(&raw_title).to_string();
        let href = anchor.value().attr("href")?.trim();
        if title.is_empty() || href.is_empty() || href.starts_with('#') {
            return None;
        }
        if title.split_whitespace().count() < self.min_title_words {
            return None;
        }
        let url = base.join(href).ok()?;

        let mut headline = Headline::new(&section.label, &title, url.as_str());
        if let Some(meta) = find_meta(anchor) {
            headline.source = meta
                .select(&selector(".src"))
                .next()
                .map(|src| collapse_whitespace(&src.text().collect::<Vec<_>>().join(" ")))
                .filter(|s| !s.is_empty());
            if let Some(time) = meta.select(&selector(".time")).next() {
                headline.published_label = Some(collapse_whitespace(&time.text().collect::<String>()))
                    .filter(|s| !s.is_empty());
                headline.published_at = time.value().attr("data-time").and_then(parse_epoch);
            }
        }
        Some(headline)
    }
}

/// The `span.meta` block belonging to an anchor: inside its parent, or a later sibling.
fn find_meta(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let in_parent = anchor
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.select(&selector("span.meta")).next());
    in_parent.or_else(|| {
        anchor
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "span" && el.value().classes().any(|c| c == "meta"))
    })
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let secs = raw.trim().parse::<f64>().ok()?;
    DateTime::from_timestamp(secs as i64, 0)
}

/// Drop repeated fingerprints, keeping the first occurrence.
pub fn dedupe(headlines: Vec<Headline>) -> Vec<Headline> {
    let mut seen = HashSet::new();
    headlines
        .into_iter()
        .filter(|h| seen.insert(h.fingerprint.clone()))
        .collect()
}

/// Mix sections round-robin: first of each section, then second of each, and so on.
pub fn interleave(per_section: &[Vec<Headline>]) -> Vec<Headline> {
    let longest = per_section.iter().map(Vec::len).max().unwrap_or(0);
    let mut mixed = Vec::with_capacity(per_section.iter().map(Vec::len).sum());
    for index in 0..longest {
        for section in per_section {
            if let Some(headline) = section.get(index) {
                mixed.push(headline.clone());
            }
        }
    }
    dedupe(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTION_PAGE: &str = r##"
<html><body>
  <header><a href="/nav">Skip this navigation link here</a></header>
  <div id="newsfeed">
    <div class="hl">
      <a class="newsfeed__title-link" href="/A/111">Chipmakers race to build faster accelerators</a>
      <span class="meta"><span class="src">The Register</span><span class="time" data-time="1760860800">10:00</span></span>
    </div>
    <div class="hl">
      <a class="newsfeed__title-link" href="https://example.org/story#frag">Researchers map &amp;amp; catalogue deep-sea vents</a>
    </div>
    <div class="hl">
      <a class="newsfeed__title-link" href="/A/222">Too short</a>
    </div>
    <div class="hl">
      <a class="newsfeed__title-link" href="#">Anchor without a target page</a>
    </div>
    <div class="hl">
      <a class="newsfeed__title-link" href="/A/111">Chipmakers race to build faster accelerators</a>
    </div>
    <h3>More Stories</h3>
    <div class="hl">
      <a class="newsfeed__title-link" href="/A/333">Story after the cutoff marker line</a>
    </div>
  </div>
  <aside><a class="other" href="/ads/1">Sponsored link outside the feed</a></aside>
</body></html>
"##;

    fn tech() -> Section {
        Section::new("Tech", "https://www.newsnow.com/us/Tech?type=ln")
    }

    #[test]
    fn test_parses_candidates_until_cutoff() {
        let headlines = Normalizer::default().normalize(&tech(), SECTION_PAGE).unwrap();
        let titles: Vec<&str> = headlines.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Chipmakers race to build faster accelerators",
                "Researchers map & catalogue deep-sea vents",
            ]
        );
        assert_eq!(headlines[0].url, "https://www.newsnow.com/A/111");
        assert_eq!(headlines[0].section, "Tech");
    }

    #[test]
    fn test_reads_meta_block() {
        let headlines = Normalizer::default().normalize(&tech(), SECTION_PAGE).unwrap();
        let first = &headlines[0];
        assert_eq!(first.source.as_deref(), Some("The Register"));
        assert_eq!(first.published_label.as_deref(), Some("10:00"));
        assert_eq!(first.published_at.map(|t| t.timestamp()), Some(1_760_860_800));
        assert!(headlines[1].source.is_none());
    }

    #[test]
    fn test_falls_back_to_all_anchors_without_candidates() {
        let page = r#"<html><body><main>
            <a href="/x">Plain anchor with several words</a>
            <a href="/y">Another plain anchor here</a>
        </main></body></html>"#;
        let headlines = Normalizer::default().normalize(&tech(), page).unwrap();
        assert_eq!(headlines.len(), 2);
    }

    #[test]
    fn test_max_per_section() {
        let config = FetchConfig {
            max_per_section: Some(1),
            ..Default::default()
        };
        let headlines = Normalizer::new(&config).normalize(&tech(), SECTION_PAGE).unwrap();
        assert_eq!(headlines.len(), 1);
    }

    #[test]
    fn test_deterministic_output() {
        let normalizer = Normalizer::default();
        let a = normalizer.normalize(&tech(), SECTION_PAGE).unwrap();
        let b = normalizer.normalize(&tech(), SECTION_PAGE).unwrap();
        let fa: Vec<_> = a.iter().map(|h| &h.fingerprint).collect();
        let fb: Vec<_> = b.iter().map(|h| &h.fingerprint).collect();
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_interleave_round_robin_and_dedupe() {
        let h = |section: &str, n: u32| {
            Headline::new(section, &format!("{} story number {}", section, n), &format!("https://e.com/{}/{}", section, n))
        };
        let shared = h("Tech", 9);
        let tech = vec![h("Tech", 1), h("Tech", 2), shared.clone()];
        let science = vec![h("Science", 1), shared];

        let mixed = interleave(&[tech, science]);
        let titles: Vec<&str> = mixed.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Tech story number 1",
                "Science story number 1",
                "Tech story number 2",
                "Tech story number 9",
            ]
        );
    }
}
