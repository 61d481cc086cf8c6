//! Articles Service: turns a feed URL into a deduplicated, comparison-aware
//! stream of deliverable articles.
//!
//! This crate has no network-facing transport of its own — callers embed it
//! directly and decide when to poll, how to deliver, and what storage
//! backends to provide (default SQLite/in-process implementations are
//! included for `FieldStore`, `ComparisonRegistry`, and `CacheStore`).
//!
//! # Example
//!
//! ```ignore
//! use articles_service::{ArticlesService, Config};
//! use articles_service::service::cache::InMemoryCacheStore;
//! use articles_service::service::fetch_orchestrator::ReqwestFetcher;
//! use articles_service::store::{Database, SqliteFieldStore, SqliteComparisonRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let db = Database::open("articles.db").await?;
//! let service = ArticlesService::new(
//!     Arc::new(ReqwestFetcher::new(std::time::Duration::from_secs(30), 10 * 1024 * 1024)),
//!     Arc::new(InMemoryCacheStore::new()),
//!     Arc::new(SqliteFieldStore::new(db.clone())),
//!     Arc::new(SqliteComparisonRegistry::new(db)),
//!     Config::default(),
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod traits;
pub mod util;

pub use config::Config;
pub use error::ServiceError;
pub use model::{
    Article, Comparison, ComparisonKind, ComparisonRegistryRow, FeedId, FieldValue, RawDates,
    StoredFieldRow,
};
pub use service::ArticlesService;
pub use traits::{CacheStore, ComparisonRegistry, FieldStore, Fetcher, Flattener};
