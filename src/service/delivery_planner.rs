//! The central dedup + comparison + staged-persistence algorithm.
//!
//! Grounded on `storage/feeds.rs::complete_feed_refresh`'s pattern of
//! bundling multiple related writes behind one call and verifying
//! consistency afterward; the concurrent-seed-race tolerance is grounded on
//! `storage/articles.rs::upsert_articles`'s `INSERT OR IGNORE` +
//! `changes()` idiom (delegated here to `FieldStore::persist`, see
//! `store::field_store`).
//!
//! `FieldStore` and `ComparisonRegistry` are separate trait boundaries (by
//! design — a caller may back them with different stores), so unlike
//! `complete_feed_refresh`'s single SQL transaction this pass issues one
//! `persist` call per store rather than one cross-store transaction. This is
//! a deliberate simplification recorded in DESIGN.md.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::error::ServiceError;
use crate::model::{
    Article, Comparison, ComparisonKind, ComparisonRegistryRow, FeedId, FieldValue, StoredFieldRow,
};
use crate::service::article_builder::build_articles;
use crate::service::xml_parser::parse_feed;
use crate::traits::{ComparisonRegistry, FieldStore, Flattener};

pub struct DeliveryPlanner {
    pub field_store: Arc<dyn FieldStore>,
    pub comparison_registry: Arc<dyn ComparisonRegistry>,
    pub config: Config,
}

impl DeliveryPlanner {
    pub fn new(
        field_store: Arc<dyn FieldStore>,
        comparison_registry: Arc<dyn ComparisonRegistry>,
        config: Config,
    ) -> Self {
        Self {
            field_store,
            comparison_registry,
            config,
        }
    }

    /// Runs the full 9-step algorithm (spec §4.H) over already-fetched feed
    /// bytes, returning the articles that should be delivered on this pass.
    /// `max_article_age`, given, keeps an article iff `now - date <=
    /// max_article_age` (checking `raw.updated` then `raw.published`) and
    /// drops it otherwise — an article with neither date is always dropped.
    pub async fn get_articles_to_deliver_from_xml(
        &self,
        feed_id: FeedId,
        xml: Bytes,
        flattener: &dyn Flattener,
        comparisons: &[Comparison],
        max_article_age: Option<Duration>,
    ) -> Result<Vec<Article>, ServiceError> {
        // Step 1: resolve articles.
        let feed = parse_feed(
            xml,
            Duration::from_secs(self.config.feed_parse_timeout_secs),
        )
        .await
        .map_err(|e| match e {
            crate::service::xml_parser::ParseError::InvalidFeed(msg) => ServiceError::InvalidFeed(msg),
            crate::service::xml_parser::ParseError::Timeout(d) => ServiceError::FeedParseTimeout(d),
        })?;
        let articles = build_articles(&feed.entries, flattener)?;

        // Step 2: seed pass detection. Seeding persists id rows *and*
        // comparison field rows for every comparison passed in, so a later
        // poll sees those comparisons as already activated rather than
        // deferring them to the backfill path below.
        let is_seed_pass = !self
            .field_store
            .has_articles_stored_for_feed(feed_id)
            .await?;

        if is_seed_pass {
            self.seed_all(feed_id, &articles, comparisons).await?;
            tracing::info!(feed_id = %feed_id, count = articles.len(), "seed pass: persisted without delivering");
            return Ok(Vec::new());
        }

        // Step 3: partition new vs. seen.
        let all_hashes: Vec<String> = articles.iter().map(|a| a.id_hash.clone()).collect();
        let existing = self
            .field_store
            .some_fields_exist(feed_id, &all_hashes)
            .await?;
        let existing: std::collections::HashSet<&String> = existing.iter().collect();

        let (new_articles, seen_articles): (Vec<Article>, Vec<Article>) = articles
            .into_iter()
            .partition(|a| !existing.contains(&a.id_hash));

        // Step 4: split each comparison into "activated" (has prior registry
        // rows from before this poll) or not, fetching its prior rows once.
        let mut prior_rows: HashMap<String, Vec<ComparisonRegistryRow>> = HashMap::new();
        for comparison in comparisons {
            let prior = self
                .comparison_registry
                .find(feed_id, &comparison.key)
                .await?;
            prior_rows.insert(comparison.key.clone(), prior);
        }
        let prior_for = |key: &str| -> &[ComparisonRegistryRow] {
            prior_rows.get(key).map(Vec::as_slice).unwrap_or(&[])
        };

        // Step 6: activation backfill — comparisons with no registry rows yet
        // even though this feed already has history get evaluated against
        // already-seen articles from this same fetch, without redelivering them.
        for comparison in comparisons {
            if prior_for(&comparison.key).is_empty() && !seen_articles.is_empty() {
                self.backfill_activation(feed_id, comparison, &seen_articles)
                    .await?;
            }
        }

        // Step 5: articlesPastBlocks — activated blocking comparisons,
        // evaluated over *new* articles only.
        let mut articles_past_blocks = Vec::with_capacity(new_articles.len());
        let mut new_rows = Vec::with_capacity(new_articles.len());
        let mut registry_rows = Vec::new();

        for article in new_articles {
            new_rows.push(StoredFieldRow {
                feed_id,
                id_hash: article.id_hash.clone(),
                created_at: Utc::now(),
            });

            let mut blocked = false;
            for comparison in comparisons
                .iter()
                .filter(|c| c.kind == ComparisonKind::Blocking)
            {
                let prior = prior_for(&comparison.key);
                if prior.is_empty() {
                    continue; // not yet activated; handled by backfill, not enforcement.
                }

                let field_hash = hash_fields(&article, &comparison.fields);
                if prior.iter().any(|r| r.field_hash == field_hash) {
                    blocked = true;
                } else {
                    registry_rows.push(ComparisonRegistryRow {
                        feed_id,
                        comparison_key: comparison.key.clone(),
                        field_hash,
                        is_blocking: true,
                        created_at: Utc::now(),
                    });
                }
            }

            if !blocked {
                articles_past_blocks.push(article);
            }
        }

        // Step 7: articlesPassedComparisons — activated passing comparisons,
        // evaluated over *seen* articles only. A seen article re-enters
        // delivery iff every activated passing field's current value hash is
        // absent from the registry (the field's content changed since it was
        // last recorded).
        let mut articles_passed_comparisons = Vec::new();
        let passing_comparisons: Vec<&Comparison> = comparisons
            .iter()
            .filter(|c| c.kind == ComparisonKind::Passing)
            .collect();

        for article in &seen_articles {
            let activated: Vec<&Comparison> = passing_comparisons
                .iter()
                .copied()
                .filter(|c| !prior_for(&c.key).is_empty())
                .collect();
            if activated.is_empty() {
                continue;
            }

            let mut candidate_rows = Vec::with_capacity(activated.len());
            let mut all_mutated = true;
            for comparison in &activated {
                let field_hash = hash_fields(article, &comparison.fields);
                let prior = prior_for(&comparison.key);
                if prior.iter().any(|r| r.field_hash == field_hash) {
                    all_mutated = false;
                    break;
                }
                candidate_rows.push(ComparisonRegistryRow {
                    feed_id,
                    comparison_key: comparison.key.clone(),
                    field_hash,
                    is_blocking: false,
                    created_at: Utc::now(),
                });
            }

            if all_mutated {
                registry_rows.extend(candidate_rows);
                articles_passed_comparisons.push(article.clone());
            }
        }

        // Step 7/8: persist. `FieldStore::persist` swallows the concurrent
        // unique-constraint race internally (see store::field_store).
        self.field_store.persist(&new_rows).await?;
        self.comparison_registry.persist(&registry_rows).await?;

        // Step 9: concatenate (blocks-passed articles, then passing-comparison
        // articles), reverse to newest-first, then apply the date filter.
        let mut to_deliver = articles_past_blocks;
        to_deliver.extend(articles_passed_comparisons);
        to_deliver.reverse();

        if let Some(threshold) = max_article_age {
            let now = Utc::now();
            to_deliver.retain(|a| article_within_date_window(a, now, threshold));
        }

        Ok(to_deliver)
    }

    async fn seed_all(
        &self,
        feed_id: FeedId,
        articles: &[Article],
        comparisons: &[Comparison],
    ) -> Result<(), ServiceError> {
        let rows: Vec<StoredFieldRow> = articles
            .iter()
            .map(|a| StoredFieldRow {
                feed_id,
                id_hash: a.id_hash.clone(),
                created_at: Utc::now(),
            })
            .collect();
        self.field_store.persist(&rows).await?;

        // Seed comparisonFields = blockingComparisons ∪ passingComparisons
        // too, so activation isn't deferred to the backfill path the first
        // time a real incremental pass runs.
        let mut registry_rows = Vec::new();
        for comparison in comparisons {
            for article in articles {
                registry_rows.push(ComparisonRegistryRow {
                    feed_id,
                    comparison_key: comparison.key.clone(),
                    field_hash: hash_fields(article, &comparison.fields),
                    is_blocking: comparison.kind == ComparisonKind::Blocking,
                    created_at: Utc::now(),
                });
            }
        }
        self.comparison_registry.persist(&registry_rows).await?;
        Ok(())
    }

    async fn backfill_activation(
        &self,
        feed_id: FeedId,
        comparison: &Comparison,
        seen_articles: &[Article],
    ) -> Result<(), ServiceError> {
        let rows: Vec<ComparisonRegistryRow> = seen_articles
            .iter()
            .map(|a| ComparisonRegistryRow {
                feed_id,
                comparison_key: comparison.key.clone(),
                field_hash: hash_fields(a, &comparison.fields),
                is_blocking: comparison.kind == ComparisonKind::Blocking,
                created_at: Utc::now(),
            })
            .collect();
        tracing::debug!(
            feed_id = %feed_id,
            comparison = %comparison.key,
            count = rows.len(),
            "backfilling newly activated comparison"
        );
        self.comparison_registry.persist(&rows).await?;
        Ok(())
    }

    pub async fn delete_info_for_feed(&self, feed_id: FeedId) -> Result<(), ServiceError> {
        self.field_store.delete_all_for_feed(feed_id).await?;
        Ok(())
    }
}

/// Date check filter (spec §4.H): tries `raw.updated` ("date") then
/// `raw.published` ("pubdate"), keeps the article iff `now - date <=
/// threshold`, and drops it if neither date is present.
fn article_within_date_window(article: &Article, now: chrono::DateTime<Utc>, threshold: Duration) -> bool {
    let Some(date) = article.raw.updated.or(article.raw.published) else {
        return false;
    };

    let elapsed = now.signed_duration_since(date);
    if elapsed < chrono::Duration::zero() {
        return true; // dated in the future relative to `now`; trivially within window.
    }
    match elapsed.to_std() {
        Ok(elapsed) => elapsed <= threshold,
        Err(_) => false,
    }
}

fn hash_fields(article: &Article, fields: &[String]) -> String {
    let mut hasher = Sha1::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        match article.flattened.get(field) {
            Some(FieldValue::Str(s)) => hasher.update(s.as_bytes()),
            Some(FieldValue::Num(n)) => hasher.update(n.to_string().as_bytes()),
            Some(FieldValue::Bool(b)) => hasher.update(b.to_string().as_bytes()),
            Some(FieldValue::Null) | None => hasher.update(b"null"),
        };
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, SqliteComparisonRegistry, SqliteFieldStore};
    use feed_rs::model::Entry;
    use std::collections::HashMap;

    struct TitleFlattener;
    impl Flattener for TitleFlattener {
        fn flatten(&self, entry: &Entry) -> HashMap<String, FieldValue> {
            let mut map = HashMap::new();
            if let Some(title) = &entry.title {
                map.insert("title".to_string(), FieldValue::Str(title.content.clone()));
            }
            map
        }
    }

    async fn planner() -> DeliveryPlanner {
        let db = Database::open(":memory:").await.unwrap();
        DeliveryPlanner::new(
            Arc::new(SqliteFieldStore::new(db.clone())),
            Arc::new(SqliteComparisonRegistry::new(db)),
            Config::default(),
        )
    }

    fn rss(items: &[(&str, &str)]) -> Bytes {
        let mut body = String::from("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>");
        for (guid, title) in items {
            body.push_str(&format!(
                "<item><guid>{guid}</guid><title>{title}</title><link>https://example.com/{guid}</link></item>"
            ));
        }
        body.push_str("</channel></rss>");
        Bytes::from(body)
    }

    #[tokio::test]
    async fn seed_pass_persists_without_delivering() {
        let planner = planner().await;
        let xml = rss(&[("1", "First"), ("2", "Second")]);

        let delivered = planner
            .get_articles_to_deliver_from_xml(FeedId(1), xml, &TitleFlattener, &[], None)
            .await
            .unwrap();

        assert!(delivered.is_empty());
        assert!(planner
            .field_store
            .has_articles_stored_for_feed(FeedId(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn incremental_pass_delivers_only_new_articles() {
        let planner = planner().await;
        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First")]),
                &TitleFlattener,
                &[],
                None,
            )
            .await
            .unwrap();

        let delivered = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First"), ("2", "Second")]),
                &TitleFlattener,
                &[],
                None,
            )
            .await
            .unwrap();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id_hash.len(), 40);
    }

    #[tokio::test]
    async fn blocking_comparison_suppresses_repeat_value() {
        let planner = planner().await;
        let blocking = Comparison {
            key: "same_title".to_string(),
            kind: ComparisonKind::Blocking,
            fields: vec!["title".to_string()],
        };

        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First")]),
                &TitleFlattener,
                &[blocking.clone()],
                None,
            )
            .await
            .unwrap();

        // Second article has a new id_hash but the *same* title value —
        // a blocking comparison on title should suppress delivery.
        let delivered = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First"), ("2", "First")]),
                &TitleFlattener,
                &[blocking],
                None,
            )
            .await
            .unwrap();

        assert!(delivered.is_empty());
    }

    #[tokio::test]
    async fn new_article_is_delivered_regardless_of_passing_comparisons() {
        // Passing comparisons only ever withhold *seen* articles; a brand-new
        // article is subject to blocking comparisons only, so it's delivered
        // as soon as it's new — there's nothing to "pass" yet.
        let planner = planner().await;
        let passing = Comparison {
            key: "title_seen".to_string(),
            kind: ComparisonKind::Passing,
            fields: vec!["title".to_string()],
        };

        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First")]),
                &TitleFlattener,
                &[passing.clone()],
                None,
            )
            .await
            .unwrap();

        let delivered = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First"), ("2", "Brand New")]),
                &TitleFlattener,
                &[passing],
                None,
            )
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].title(), Some("Brand New"));
    }

    struct DescriptionFlattener;
    impl Flattener for DescriptionFlattener {
        fn flatten(&self, entry: &Entry) -> HashMap<String, FieldValue> {
            let mut map = HashMap::new();
            if let Some(summary) = &entry.summary {
                map.insert(
                    "description".to_string(),
                    FieldValue::Str(summary.content.clone()),
                );
            }
            map
        }
    }

    fn rss_with_description(items: &[(&str, &str)]) -> Bytes {
        let mut body = String::from(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>",
        );
        for (guid, description) in items {
            body.push_str(&format!(
                "<item><guid>{guid}</guid><title>Item {guid}</title><link>https://example.com/{guid}</link><description>{description}</description></item>"
            ));
        }
        body.push_str("</channel></rss>");
        Bytes::from(body)
    }

    #[tokio::test]
    async fn passing_comparison_redelivers_seen_article_on_content_change() {
        let planner = planner().await;
        let passing = Comparison {
            key: "description_changed".to_string(),
            kind: ComparisonKind::Passing,
            fields: vec!["description".to_string()],
        };

        // Seed pass: seeding now also records the "v1" description hash, so
        // the comparison is already activated by the next poll.
        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss_with_description(&[("1", "v1")]),
                &DescriptionFlattener,
                &[passing.clone()],
                None,
            )
            .await
            .unwrap();

        // Article "1" is seen and its description mutated to "v2" — a value
        // never recorded before, so it's re-delivered.
        let delivered = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss_with_description(&[("1", "v2")]),
                &DescriptionFlattener,
                &[passing.clone()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id_hash.len(), 40);

        // Same "v2" again: that hash is now recorded, so no re-delivery.
        let delivered_again = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss_with_description(&[("1", "v2")]),
                &DescriptionFlattener,
                &[passing],
                None,
            )
            .await
            .unwrap();
        assert!(delivered_again.is_empty());
    }

    #[tokio::test]
    async fn date_filter_drops_undated_and_out_of_window_articles() {
        let planner = planner().await;

        // Seed pass so the three items below are genuinely new on the next
        // poll and reach the date filter.
        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("seed", "Seed")]),
                &TitleFlattener,
                &[],
                None,
            )
            .await
            .unwrap();

        let fresh_pubdate = Utc::now().to_rfc2822();
        let xml = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
             <item><guid>seed</guid><title>Seed</title><link>https://example.com/seed</link></item>\
             <item><guid>fresh</guid><title>Fresh</title><link>https://example.com/fresh</link><pubDate>{fresh_pubdate}</pubDate></item>\
             <item><guid>stale</guid><title>Stale</title><link>https://example.com/stale</link><pubDate>Mon, 01 Jan 2001 00:00:00 GMT</pubDate></item>\
             <item><guid>undated</guid><title>Undated</title><link>https://example.com/undated</link></item>\
             </channel></rss>"
        );

        let delivered = planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                Bytes::from(xml),
                &TitleFlattener,
                &[],
                Some(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].title(), Some("Fresh"));
    }

    #[tokio::test]
    async fn delete_info_for_feed_clears_seed_state() {
        let planner = planner().await;
        planner
            .get_articles_to_deliver_from_xml(
                FeedId(1),
                rss(&[("1", "First")]),
                &TitleFlattener,
                &[],
                None,
            )
            .await
            .unwrap();

        planner.delete_info_for_feed(FeedId(1)).await.unwrap();
        assert!(!planner
            .field_store
            .has_articles_stored_for_feed(FeedId(1))
            .await
            .unwrap());
    }
}
