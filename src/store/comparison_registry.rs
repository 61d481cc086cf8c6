//! SQLite-backed `ComparisonRegistry`, grounded on the teacher's
//! `storage/feeds.rs` upsert-with-chunking idiom (100-row chunks there for
//! feed sync; reused here at the same chunk size since registry rows are
//! similarly small and this isn't the hot path articles.rs optimizes for).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::QueryBuilder;

use crate::model::{ComparisonRegistryRow, FeedId};
use crate::traits::ComparisonRegistry;

use super::{Database, StoreError};

const PERSIST_CHUNK_SIZE: usize = 100;

pub struct SqliteComparisonRegistry {
    db: Database,
}

impl SqliteComparisonRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ComparisonRegistry for SqliteComparisonRegistry {
    async fn find(
        &self,
        feed_id: FeedId,
        comparison_key: &str,
    ) -> Result<Vec<ComparisonRegistryRow>, StoreError> {
        let rows: Vec<(i64, String, String, i64, String)> = sqlx::query_as(
            "SELECT feed_id, comparison_key, field_hash, is_blocking, created_at \
             FROM comparison_registry WHERE feed_id = ? AND comparison_key = ?",
        )
        .bind(feed_id.0)
        .bind(comparison_key)
        .fetch_all(&self.db.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(
                |(feed_id, comparison_key, field_hash, is_blocking, created_at)| {
                    ComparisonRegistryRow {
                        feed_id: FeedId(feed_id),
                        comparison_key,
                        field_hash,
                        is_blocking: is_blocking != 0,
                        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                    }
                },
            )
            .collect())
    }

    async fn persist(&self, rows: &[ComparisonRegistryRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool.begin().await.map_err(StoreError::from_sqlx)?;

        for chunk in rows.chunks(PERSIST_CHUNK_SIZE) {
            let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO comparison_registry \
                 (feed_id, comparison_key, field_hash, is_blocking, created_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.feed_id.0)
                    .push_bind(&row.comparison_key)
                    .push_bind(&row.field_hash)
                    .push_bind(row.is_blocking as i64)
                    .push_bind(row.created_at.to_rfc3339());
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}
