//! Fetches feed bytes over HTTP, with retry/backoff and HTML-fallback feed
//! discovery when the given URL isn't already a feed document.
//!
//! Grounded directly on `feed::fetcher::fetch_one` (30s timeout, exponential
//! backoff on 429/5xx, `MAX_RETRIES`, size-limited body read) and
//! `feed::discovery` (`discover_from_html`, `find_feed_link_in_html`,
//! SSRF-safe `resolve_url`, `/feed`/`/rss` probing added on top of its
//! Content-Type dispatch).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use crate::traits::Fetcher;
use crate::util::validate_url;

const MAX_RETRIES: u32 = 3;
const FEED_PROBE_PATHS: &[&str] = &["/feed", "/rss"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(StatusCode),
    #[error("request timed out")]
    Timeout,
    #[error("response body exceeded the size limit of {0} bytes")]
    ResponseTooLarge(u64),
    #[error("response ended before the declared content length")]
    IncompleteResponse,
    #[error("no feed could be found at or linked from this URL")]
    NoFeedFound,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Default `Fetcher`: a `reqwest::Client` with retry/backoff and a hard
/// response-size ceiling, matching `fetcher.rs::read_limited_bytes`.
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
    max_body_bytes: u64,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, max_body_bytes: u64) -> Self {
        Self {
            client: Client::builder()
                .redirect(reqwest::redirect::Policy::limited(3))
                .build()
                .expect("reqwest client configuration is valid"),
            timeout,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        fetch_with_retry(&self.client, url, self.timeout, self.max_body_bytes).await
    }
}

async fn fetch_with_retry(
    client: &Client,
    url: &str,
    timeout: Duration,
    max_body_bytes: u64,
) -> Result<Bytes, FetchError> {
    let mut attempt = 0;
    loop {
        let result = fetch_once(client, url, timeout, max_body_bytes).await;
        match result {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < MAX_RETRIES && is_retryable(&err) => {
                let backoff = Duration::from_secs(2u64.pow(attempt));
                tracing::debug!(url, attempt, ?backoff, error = %err, "retrying fetch");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_retryable(err: &FetchError) -> bool {
    matches!(
        err,
        FetchError::HttpStatus(status)
            if status.as_u16() == 429 || status.is_server_error()
    ) || matches!(err, FetchError::Timeout | FetchError::IncompleteResponse)
}

async fn fetch_once(
    client: &Client,
    url: &str,
    timeout: Duration,
    max_body_bytes: u64,
) -> Result<Bytes, FetchError> {
    let request = client.get(url).send();
    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(|e| FetchError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status()));
    }

    let declared_len = response.content_length();
    let bytes = read_limited_bytes(response, max_body_bytes).await?;

    if let Some(declared) = declared_len {
        if (bytes.len() as u64) < declared {
            return Err(FetchError::IncompleteResponse);
        }
    }

    Ok(bytes)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<Bytes, FetchError> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Network(e.to_string()))?;
        if buf.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(FetchError::ResponseTooLarge(max_bytes));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buf))
}

/// Fetches `url` directly; if the bytes don't parse as a feed, falls back to
/// HTML discovery (link-tag extraction) and then to probing `/feed` and
/// `/rss` relative to the URL's origin. Mirrors `discovery::discover_feed`'s
/// Content-Type-driven dispatch, generalized with the two probe paths the
/// specification calls out by name.
pub async fn fetch_feed_bytes(
    fetcher: &dyn Fetcher,
    feed_url: &str,
) -> Result<Bytes, FetchError> {
    validate_url(feed_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

    match fetcher.fetch(feed_url).await {
        Ok(bytes) if looks_like_feed(&bytes) => Ok(bytes),
        Ok(html_bytes) => fetch_via_discovery(fetcher, feed_url, &html_bytes).await,
        Err(err) => Err(err),
    }
}

fn looks_like_feed(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]);
    head.contains("<rss") || head.contains("<feed") || head.contains("<rdf:RDF")
}

async fn fetch_via_discovery(
    fetcher: &dyn Fetcher,
    original_url: &str,
    html_bytes: &[u8],
) -> Result<Bytes, FetchError> {
    let base = Url::parse(original_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

    if let Some(discovered) = find_feed_link_in_html(html_bytes, &base) {
        if validate_url(&discovered).is_ok() {
            if let Ok(bytes) = fetcher.fetch(&discovered).await {
                if looks_like_feed(&bytes) {
                    return Ok(bytes);
                }
            }
        }
    }

    for path in FEED_PROBE_PATHS {
        let mut probe = base.clone();
        probe.set_path(path);
        if validate_url(probe.as_str()).is_ok() {
            if let Ok(bytes) = fetcher.fetch(probe.as_str()).await {
                if looks_like_feed(&bytes) {
                    return Ok(bytes);
                }
            }
        }
    }

    Err(FetchError::NoFeedFound)
}

/// Hand-rolled scan for `<link rel="alternate" type="application/rss+xml"
/// | "application/atom+xml" ...>`, grounded verbatim on
/// `discovery::find_feed_link_in_html`'s approach of a lightweight string
/// scan rather than a full HTML parser (feed discovery only needs `<link>`
/// tags in `<head>`, not general DOM traversal).
fn find_feed_link_in_html(html_bytes: &[u8], base: &Url) -> Option<String> {
    let html = String::from_utf8_lossy(html_bytes);
    for tag in html.split("<link").skip(1) {
        let tag_end = tag.find('>').unwrap_or(tag.len());
        let tag = &tag[..tag_end];

        let is_feed_rel = tag.contains("rel=\"alternate\"") || tag.contains("rel='alternate'");
        let is_feed_type = tag.contains("application/rss+xml") || tag.contains("application/atom+xml");

        if is_feed_rel && is_feed_type {
            if let Some(href) = extract_attr_value(tag, "href") {
                return resolve_url(&href, base);
            }
        }
    }
    None
}

fn extract_attr_value(tag: &str, attr: &str) -> Option<String> {
    let needle_double = format!("{attr}=\"");
    let needle_single = format!("{attr}='");

    if let Some(start) = tag.find(&needle_double) {
        let rest = &tag[start + needle_double.len()..];
        let end = rest.find('"')?;
        return Some(rest[..end].to_string());
    }
    if let Some(start) = tag.find(&needle_single) {
        let rest = &tag[start + needle_single.len()..];
        let end = rest.find('\'')?;
        return Some(rest[..end].to_string());
    }
    None
}

/// Resolves a possibly-relative href against `base`, guarding against
/// protocol-relative URLs smuggling a different (SSRF-relevant) host via the
/// `url` crate's own join semantics — matches `discovery::resolve_url`.
fn resolve_url(href: &str, base: &Url) -> Option<String> {
    if href.starts_with("//") {
        let with_scheme = format!("{}:{}", base.scheme(), href);
        return Url::parse(&with_scheme).ok().map(|u| u.to_string());
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).ok().map(|u| u.to_string());
    }
    base.join(href).ok().map(|u| u.to_string())
}
