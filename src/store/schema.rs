//! Connection setup and migrations, grounded directly on the teacher's
//! `storage/schema.rs`: 0600 file permissions set before the pool opens the
//! file (TOCTOU-safe), a `busy_timeout` pragma so concurrent pollers back off
//! instead of erroring immediately, and a single-transaction migration.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use super::StoreError;

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        // SEC-010: create (and chmod) the file ourselves before sqlx's pool
        // touches it, so there is no window where the file exists world- or
        // group-readable before we get to lock it down.
        #[cfg(unix)]
        if path != ":memory:" && !std::path::Path::new(path).exists() {
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o600)
                .open(path)
                .map_err(|e| StoreError::Other(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))
            .map_err(StoreError::from_sqlx)?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stored_fields (
                feed_id INTEGER NOT NULL,
                id_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (feed_id, id_hash)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_stored_fields_feed ON stored_fields(feed_id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comparison_registry (
                feed_id INTEGER NOT NULL,
                comparison_key TEXT NOT NULL,
                field_hash TEXT NOT NULL,
                is_blocking INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (feed_id, comparison_key, field_hash)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comparison_registry_feed_key ON comparison_registry(feed_id, comparison_key)",
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}
