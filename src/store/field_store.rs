//! SQLite-backed `FieldStore`, grounded on the teacher's
//! `storage/articles.rs::upsert_articles`: chunked `INSERT OR IGNORE` with
//! `changes()` used to detect how many rows were genuinely new, and
//! `storage/content_cache.rs::cached_article_ids`'s 500-row chunk size
//! (SQLite's bind-parameter ceiling is 999; each row here binds 2 params).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::QueryBuilder;

use crate::model::{FeedId, StoredFieldRow};
use crate::traits::FieldStore;

use super::{Database, StoreError};

/// Rows per `INSERT` statement. 500 rows * 2 binds/row stays well under
/// SQLite's 999-parameter limit with room to spare.
const PERSIST_CHUNK_SIZE: usize = 500;

pub struct SqliteFieldStore {
    db: Database,
}

impl SqliteFieldStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FieldStore for SqliteFieldStore {
    async fn persist(&self, rows: &[StoredFieldRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool.begin().await.map_err(StoreError::from_sqlx)?;

        for chunk in rows.chunks(PERSIST_CHUNK_SIZE) {
            let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO stored_fields (feed_id, id_hash, created_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.feed_id.0)
                    .push_bind(&row.id_hash)
                    .push_bind(row.created_at.to_rfc3339());
            });
            let result = qb.build().execute(&mut *tx).await.map_err(StoreError::from_sqlx)?;
            // A 0-vs-N changes() delta here is the concurrent-seed-race case
            // (spec §4.H step 8): another poller already inserted the same
            // (feed_id, id_hash) pair. That's expected, not an error.
            if (result.rows_affected() as usize) < chunk.len() {
                tracing::debug!(
                    feed_id = chunk[0].feed_id.0,
                    attempted = chunk.len(),
                    inserted = result.rows_affected(),
                    "some id_hash rows already existed (concurrent seed race)"
                );
            }
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_id_fields_for_feed(&self, feed_id: FeedId) -> Result<Vec<StoredFieldRow>, StoreError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT feed_id, id_hash, created_at FROM stored_fields WHERE feed_id = ?",
        )
        .bind(feed_id.0)
        .fetch_all(&self.db.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(feed_id, id_hash, created_at)| StoredFieldRow {
                feed_id: FeedId(feed_id),
                id_hash,
                created_at: created_at
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    async fn some_fields_exist(
        &self,
        feed_id: FeedId,
        id_hashes: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if id_hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for chunk in id_hashes.chunks(PERSIST_CHUNK_SIZE) {
            let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "SELECT id_hash FROM stored_fields WHERE feed_id = ",
            );
            qb.push_bind(feed_id.0);
            qb.push(" AND id_hash IN (");
            {
                let mut sep = qb.separated(", ");
                for hash in chunk {
                    sep.push_bind(hash);
                }
            }
            qb.push(")");

            let rows: Vec<(String,)> = qb
                .build_query_as()
                .fetch_all(&self.db.pool)
                .await
                .map_err(StoreError::from_sqlx)?;
            found.extend(rows.into_iter().map(|(h,)| h));
        }

        Ok(found)
    }

    async fn has_articles_stored_for_feed(&self, feed_id: FeedId) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stored_fields WHERE feed_id = ?")
            .bind(feed_id.0)
            .fetch_one(&self.db.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(row.0 > 0)
    }

    async fn delete_all_for_feed(&self, feed_id: FeedId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM stored_fields WHERE feed_id = ?")
            .bind(feed_id.0)
            .execute(&self.db.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteFieldStore {
        let db = Database::open(":memory:").await.unwrap();
        SqliteFieldStore::new(db)
    }

    fn row(feed: i64, hash: &str) -> StoredFieldRow {
        StoredFieldRow {
            feed_id: FeedId(feed),
            id_hash: hash.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persist_and_find_round_trip() {
        let store = test_store().await;
        store.persist(&[row(1, "a"), row(1, "b")]).await.unwrap();

        let found = store.find_id_fields_for_feed(FeedId(1)).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_seed_race_is_swallowed() {
        let store = test_store().await;
        store.persist(&[row(1, "a")]).await.unwrap();
        // Re-persisting the same row must not error (unique constraint hit
        // and ignored, matching spec §4.H step 8).
        store.persist(&[row(1, "a")]).await.unwrap();

        let found = store.find_id_fields_for_feed(FeedId(1)).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn has_articles_stored_reflects_seed_state() {
        let store = test_store().await;
        assert!(!store.has_articles_stored_for_feed(FeedId(1)).await.unwrap());
        store.persist(&[row(1, "a")]).await.unwrap();
        assert!(store.has_articles_stored_for_feed(FeedId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn some_fields_exist_reports_only_matches() {
        let store = test_store().await;
        store.persist(&[row(1, "a"), row(1, "b")]).await.unwrap();

        let existing = store
            .some_fields_exist(FeedId(1), &["a".to_string(), "z".to_string()])
            .await
            .unwrap();
        assert_eq!(existing, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn delete_all_for_feed_clears_rows() {
        let store = test_store().await;
        store.persist(&[row(1, "a")]).await.unwrap();
        store.delete_all_for_feed(FeedId(1)).await.unwrap();
        assert!(!store.has_articles_stored_for_feed(FeedId(1)).await.unwrap());
    }
}
