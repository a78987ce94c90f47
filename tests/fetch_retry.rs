use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use headwire::config::FetchConfig;
use headwire::domain::Section;
use headwire::fetcher::{fetch_with_retry, FetchPipeline, HttpFetcher, RetryPolicy, SectionStatus, UserAgentPool};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn section_page(titles: &[&str]) -> String {
    let links: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                r#"<div class="hl"><a class="newsfeed__title-link" href="/story/{}">{}</a></div>"#,
                i, title
            )
        })
        .collect();
    format!(r#"<html><body><div id="newsfeed">{}</div></body></html>"#, links)
}

fn agents() -> Vec<String> {
    vec!["agent-one/1.0".into(), "agent-two/2.0".into(), "agent-three/3.0".into()]
}

fn fast_config(sections: Vec<Section>) -> FetchConfig {
    FetchConfig {
        sections,
        timeout_secs: 2,
        backoff_base_ms: 10,
        backoff_max_ms: 40,
        user_agents: agents(),
        ..Default::default()
    }
}

#[tokio::test]
async fn rate_limited_twice_then_succeeds_with_rotated_agents() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tech"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tech"))
        .respond_with(ResponseTemplate::new(200).set_body_string(section_page(&["Chip demand keeps rising"])))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
    let policy = RetryPolicy {
        max_attempts: 3,
        base: Duration::from_millis(10),
        max: Duration::from_millis(40),
    };
    let pool = UserAgentPool::new(&agents());
    let url = format!("{}/tech", server.uri());

    let outcome = fetch_with_retry(&fetcher, &url, Some(&url), &policy, &pool).await;

    assert_eq!(outcome.attempts, 3);
    assert!(outcome.result.unwrap().body.contains("Chip demand keeps rising"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let used: HashSet<String> = requests
        .iter()
        .filter_map(|r| r.headers.get("user-agent"))
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    assert_eq!(used.len(), 3);
    assert!(requests[0].headers.get("referer").is_none());
    assert!(requests[1].headers.get("referer").is_some());
}

#[tokio::test]
async fn pipeline_reports_failed_section_without_failing_others() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tech"))
        .respond_with(ResponseTemplate::new(200).set_body_string(section_page(&[
            "Chip demand keeps rising",
            "New battery chemistry unveiled",
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/science"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&server)
        .await;

    let sections = vec![
        Section::new("Tech", format!("{}/tech", server.uri())),
        Section::new("Science", format!("{}/science", server.uri())),
    ];
    let config = fast_config(sections.clone());
    let fetcher = Arc::new(HttpFetcher::new(config.timeout()).unwrap());
    let pipeline = FetchPipeline::new(fetcher, &config);

    let report = pipeline.fetch_sections(&sections).await;

    assert_eq!(report.successful_sections(), 1);
    assert_eq!(report.sections[0].status, SectionStatus::Fetched { count: 2 });
    assert!(matches!(report.sections[1].status, SectionStatus::Failed { .. }));
    assert_eq!(report.sections[1].attempts, 3);

    let headlines = report.headlines();
    assert_eq!(headlines.len(), 2);
    assert_eq!(headlines[0].url, format!("{}/story/0", server.uri()));
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
    let url = format!("{}/gone", server.uri());
    let outcome = fetch_with_retry(
        &fetcher,
        &url,
        None,
        &RetryPolicy::default(),
        &UserAgentPool::new(&agents()),
    )
    .await;

    assert_eq!(outcome.attempts, 1);
    assert!(outcome.result.is_err());
}
