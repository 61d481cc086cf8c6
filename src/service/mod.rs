//! The nine components from the specification's system overview, plus the
//! `ArticlesService` facade that wires them together into the exposed
//! operations (spec §6).

pub mod article_builder;
pub mod cache;
pub mod delivery_planner;
pub mod fetch_orchestrator;
pub mod id_resolver;
pub mod lookup;
pub mod xml_parser;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::ServiceError;
use crate::model::{Article, Comparison, FeedId};
use crate::traits::{CacheStore, ComparisonRegistry, FieldStore, Fetcher, Flattener};

use cache::CanonicalCacheKey;
use delivery_planner::DeliveryPlanner;
use fetch_orchestrator::fetch_feed_bytes;
use xml_parser::parse_feed;

/// Wires the nine components together behind the operation names the
/// specification exposes (spec §6). Construct one per process; it is cheap
/// to clone (everything inside is `Arc`).
#[derive(Clone)]
pub struct ArticlesService {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn CacheStore>,
    planner: Arc<DeliveryPlanner>,
    config: Config,
}

impl ArticlesService {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn CacheStore>,
        field_store: Arc<dyn FieldStore>,
        comparison_registry: Arc<dyn ComparisonRegistry>,
        config: Config,
    ) -> Self {
        let planner = Arc::new(DeliveryPlanner::new(
            field_store,
            comparison_registry,
            config.clone(),
        ));
        Self {
            fetcher,
            cache,
            planner,
            config,
        }
    }

    /// Fetches (with HTML-fallback discovery) and resolves every article
    /// currently in a feed, bypassing the cache.
    pub async fn fetch_feed_articles(
        &self,
        feed_url: &str,
        flattener: &dyn Flattener,
    ) -> Result<Vec<Article>, ServiceError> {
        let bytes = fetch_feed_bytes(self.fetcher.as_ref(), feed_url).await?;
        let feed = parse_feed(
            bytes,
            Duration::from_secs(self.config.feed_parse_timeout_secs),
        )
        .await
        .map_err(|e| match e {
            xml_parser::ParseError::InvalidFeed(msg) => ServiceError::InvalidFeed(msg),
            xml_parser::ParseError::Timeout(d) => ServiceError::FeedParseTimeout(d),
        })?;
        article_builder::build_articles(&feed.entries, flattener)
    }

    /// Same as `fetch_feed_articles`, but serves from (and populates) the
    /// TTL cache keyed by the feed URL plus `options`.
    pub async fn find_or_fetch_feed_articles(
        &self,
        feed_url: &str,
        options: &HashMap<String, String>,
        flattener: &dyn Flattener,
    ) -> Result<Vec<Article>, ServiceError> {
        let key = CanonicalCacheKey::build(feed_url, options);

        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(feed_url, "cache hit");
            self.cache.refresh_ttl(&key, self.config.cache_ttl_secs).await;
            return Ok(cached);
        }

        let articles = self.fetch_feed_articles(feed_url, flattener).await?;
        self.cache
            .set(&key, articles.clone(), self.config.cache_ttl_secs)
            .await;
        Ok(articles)
    }

    pub async fn fetch_feed_article(
        &self,
        feed_url: &str,
        id_hash: &str,
        flattener: &dyn Flattener,
    ) -> Result<Article, ServiceError> {
        let articles = self.fetch_feed_articles(feed_url, flattener).await?;
        lookup::fetch_feed_article(&articles, id_hash)
    }

    /// Returns `None` for an empty feed rather than an error — an empty
    /// result set has nothing to sample from, which isn't the same failure
    /// as `fetch_feed_article`'s "this specific id_hash isn't present".
    pub async fn fetch_random_feed_article(
        &self,
        feed_url: &str,
        flattener: &dyn Flattener,
    ) -> Result<Option<Article>, ServiceError> {
        let articles = self.fetch_feed_articles(feed_url, flattener).await?;
        Ok(lookup::fetch_random_feed_article(&articles))
    }

    /// Runs the DeliveryPlanner's dedup/comparison/staged-persistence pass
    /// over already-fetched feed bytes. `max_article_age`, if given, drops
    /// any article whose date (from `raw.updated`/`raw.published`) is older
    /// than that, and drops undated articles outright.
    pub async fn get_articles_to_deliver_from_xml(
        &self,
        feed_id: FeedId,
        xml: bytes::Bytes,
        flattener: &dyn Flattener,
        comparisons: &[Comparison],
        max_article_age: Option<Duration>,
    ) -> Result<Vec<Article>, ServiceError> {
        self.planner
            .get_articles_to_deliver_from_xml(feed_id, xml, flattener, comparisons, max_article_age)
            .await
    }

    pub async fn delete_info_for_feed(&self, feed_id: FeedId) -> Result<(), ServiceError> {
        self.planner.delete_info_for_feed(feed_id).await
    }

    pub async fn cache_exists(&self, feed_url: &str, options: &HashMap<String, String>) -> bool {
        self.cache
            .exists(&CanonicalCacheKey::build(feed_url, options))
            .await
    }

    pub async fn cache_invalidate(&self, feed_url: &str, options: &HashMap<String, String>) {
        self.cache
            .invalidate(&CanonicalCacheKey::build(feed_url, options))
            .await
    }

    pub async fn cache_refresh_ttl(
        &self,
        feed_url: &str,
        options: &HashMap<String, String>,
        ttl_secs: u64,
    ) -> bool {
        self.cache
            .refresh_ttl(&CanonicalCacheKey::build(feed_url, options), ttl_secs)
            .await
    }
}
