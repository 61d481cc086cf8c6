//! Integration test for scenario S5 (HTML fallback discovery): the fetch
//! orchestrator should notice a non-feed response and fall back to scanning
//! the HTML for a `<link rel="alternate">` feed tag, exactly as
//! `discovery::discover_from_html` does internally.

use std::time::Duration;

use articles_service::service::fetch_orchestrator::{fetch_feed_bytes, ReqwestFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_BODY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Example</title>
<item><guid>1</guid><title>Hello</title><link>https://example.com/1</link></item>
</channel></rss>"#;

#[tokio::test]
async fn falls_back_to_html_discovered_feed_link() {
    let server = MockServer::start().await;

    let html = format!(
        r#"<html><head><link rel="alternate" type="application/rss+xml" href="{}/feed.xml"></head></html>"#,
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/blog"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_BODY))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(Duration::from_secs(5), 10 * 1024 * 1024);
    let url = format!("{}/blog", server.uri());

    let bytes = fetch_feed_bytes(&fetcher, &url).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<rss"));
}

#[tokio::test]
async fn falls_back_to_feed_path_probe_when_no_link_tag() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blog"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><head></head></html>"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_BODY))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(Duration::from_secs(5), 10 * 1024 * 1024);
    let url = format!("{}/blog", server.uri());

    let bytes = fetch_feed_bytes(&fetcher, &url).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<rss"));
}

#[tokio::test]
async fn direct_feed_response_skips_discovery() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_BODY))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(Duration::from_secs(5), 10 * 1024 * 1024);
    let url = format!("{}/feed.xml", server.uri());

    let bytes = fetch_feed_bytes(&fetcher, &url).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<rss"));
}
