//! Trait contracts for the collaborators this crate depends on. Each has a
//! default implementation elsewhere in the crate, but callers may substitute
//! their own (e.g. a different cache backend, or a FieldStore backed by
//! something other than SQLite).
//!
//! Modeled on the `StorageFetcher`/`CacheBackend` async_trait pattern from
//! the pack's caliber-storage example: small, object-safe, `async_trait`
//! contracts rather than generic associated types.

use async_trait::async_trait;
use bytes::Bytes;

use crate::model::{Article, ComparisonRegistryRow, FeedId, FieldValue, StoredFieldRow};
use crate::service::fetch_orchestrator::FetchError;
use crate::store::StoreError;
use std::collections::HashMap;

/// Retrieves raw bytes for a URL. The default implementation wraps `reqwest`
/// with the teacher's retry/backoff/circuit-breaker behavior; see
/// `service::fetch_orchestrator`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// TTL cache for resolved article lists, keyed by a canonical fingerprint of
/// the request. See `service::cache::CanonicalCacheKey`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<Article>>;
    async fn set(&self, key: &str, value: Vec<Article>, ttl_secs: u64);
    async fn exists(&self, key: &str) -> bool;
    async fn invalidate(&self, key: &str);
    async fn refresh_ttl(&self, key: &str, ttl_secs: u64) -> bool;
}

/// Per-feed persistence of which id_hashes have already been seen.
#[async_trait]
pub trait FieldStore: Send + Sync {
    async fn persist(&self, rows: &[StoredFieldRow]) -> Result<(), StoreError>;
    async fn find_id_fields_for_feed(&self, feed_id: FeedId) -> Result<Vec<StoredFieldRow>, StoreError>;
    async fn some_fields_exist(&self, feed_id: FeedId, id_hashes: &[String]) -> Result<Vec<String>, StoreError>;
    async fn has_articles_stored_for_feed(&self, feed_id: FeedId) -> Result<bool, StoreError>;
    async fn delete_all_for_feed(&self, feed_id: FeedId) -> Result<(), StoreError>;
}

/// Per-feed persistence of comparison evaluation results.
#[async_trait]
pub trait ComparisonRegistry: Send + Sync {
    async fn find(&self, feed_id: FeedId, comparison_key: &str) -> Result<Vec<ComparisonRegistryRow>, StoreError>;
    async fn persist(&self, rows: &[ComparisonRegistryRow]) -> Result<(), StoreError>;
}

/// Converts one raw feed entry into a flattened field map. Callers supply
/// their own implementation; this crate only specifies the boundary.
pub trait Flattener: Send + Sync {
    fn flatten(&self, entry: &feed_rs::model::Entry) -> HashMap<String, FieldValue>;
}
