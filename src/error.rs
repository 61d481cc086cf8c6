use thiserror::Error;

use crate::service::fetch_orchestrator::FetchError;
use crate::store::StoreError;

/// Crate-wide error type. Component errors convert in via `#[from]`; callers
/// that only care about the coarse variant table from the original
/// specification can match on this directly.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Feed bytes did not parse as a valid RSS/Atom document.
    #[error("invalid feed: {0}")]
    InvalidFeed(String),

    /// Parsing the feed took longer than the configured timeout.
    #[error("feed parse timed out after {0:?}")]
    FeedParseTimeout(std::time::Duration),

    /// No article in the feed carried any of the identity candidate fields.
    #[error("no usable id field (guid/pubdate/title/link) found for feed")]
    NoIdType,

    /// An article reached persistence without an id_hash already computed.
    #[error("article is missing its id_hash")]
    MissingIdHash,

    /// A fetch for this feed is already in flight (caller-level de-duplication hook).
    #[error("a request for this feed is already pending")]
    PendingRequest,

    /// `fetch_feed_article` could not find the requested id_hash in the feed.
    #[error("article not found in feed")]
    FeedArticleNotFound,

    /// A unique-constraint violation escaped the expected swallow-and-log path.
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
