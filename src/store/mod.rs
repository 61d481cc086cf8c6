//! SQLite-backed default implementations of `FieldStore` and
//! `ComparisonRegistry`, plus the shared `Database` handle they're built on.

mod comparison_registry;
mod field_store;
mod schema;

pub use comparison_registry::SqliteComparisonRegistry;
pub use field_store::SqliteFieldStore;
pub use schema::Database;

use thiserror::Error;

/// Storage-layer errors. Mirrors `storage::types::DatabaseError` from the
/// teacher: a dedicated variant for lock contention (so callers can give a
/// friendly "another instance is running" message) and a transparent
/// passthrough for everything else.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database is locked by another process")]
    InstanceLocked,
    #[error("database migration failed: {0}")]
    Migration(String),
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("database is locked")
            || msg.contains("database table is locked")
            || msg.contains("sqlite_busy")
            || msg.contains("sqlite_locked")
            || msg.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}
