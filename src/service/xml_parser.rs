//! Parses raw feed bytes into `feed_rs` entries, under a timeout.
//!
//! Grounded on `feed::parser`'s direct use of `feed_rs::parser::parse` and on
//! `feed::fetcher::fetch_one`'s `tokio::time::timeout` wrapping idiom — here
//! applied to the CPU-bound parse step rather than the network read.

use std::time::Duration;

use bytes::Bytes;
use feed_rs::model::Feed;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid feed: {0}")]
    InvalidFeed(String),
    #[error("feed parse timed out after {0:?}")]
    Timeout(Duration),
}

/// Parses `bytes` as an RSS/Atom feed, aborting if parsing exceeds `timeout`.
/// A structurally valid feed with zero entries yields `Ok` with an empty
/// entry list, not an error.
pub async fn parse_feed(bytes: Bytes, timeout: Duration) -> Result<Feed, ParseError> {
    let parse = tokio::task::spawn_blocking(move || {
        feed_rs::parser::parse(bytes.as_ref()).map_err(|e| ParseError::InvalidFeed(e.to_string()))
    });

    match tokio::time::timeout(timeout, parse).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ParseError::InvalidFeed(join_err.to_string())),
        Err(_) => Err(ParseError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <item>
      <title>First post</title>
      <link>https://example.com/1</link>
      <guid>1</guid>
    </item>
  </channel>
</rss>"#;

    const EMPTY_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Empty Feed</title>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_well_formed_feed() {
        let feed = parse_feed(Bytes::from_static(SAMPLE_RSS.as_bytes()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn empty_feed_yields_empty_entries_not_error() {
        let feed = parse_feed(Bytes::from_static(EMPTY_RSS.as_bytes()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(feed.entries.is_empty());
    }

    #[tokio::test]
    async fn malformed_feed_is_invalid_feed_error() {
        let err = parse_feed(Bytes::from_static(b"not xml at all"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidFeed(_)));
    }
}
