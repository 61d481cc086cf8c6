use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use articles_service::config::Config;
use articles_service::service::cache::InMemoryCacheStore;
use articles_service::service::fetch_orchestrator::ReqwestFetcher;
use articles_service::store::{Database, SqliteComparisonRegistry, SqliteFieldStore};
use articles_service::{ArticlesService, FieldValue, Flattener};

/// Default flattener used by the CLI: lifts the fields the feed formats
/// themselves define (title, link, summary) straight into the output map.
struct DefaultFlattener;

impl Flattener for DefaultFlattener {
    fn flatten(&self, entry: &feed_rs::model::Entry) -> HashMap<String, FieldValue> {
        let mut map = HashMap::new();
        if let Some(title) = &entry.title {
            map.insert("title".to_string(), FieldValue::Str(title.content.clone()));
        }
        if let Some(link) = entry.links.first() {
            map.insert("link".to_string(), FieldValue::Str(link.href.clone()));
        }
        if let Some(summary) = &entry.summary {
            map.insert(
                "summary".to_string(),
                FieldValue::Str(summary.content.clone()),
            );
        }
        map
    }
}

#[derive(Parser, Debug)]
#[command(name = "articles-service", about = "Fetch and dedup-check a feed URL")]
struct Args {
    /// Feed URL to fetch (HTML pages are followed via feed discovery).
    feed_url: String,

    /// Path to the SQLite database used for dedup/comparison state.
    #[arg(long, default_value = "articles-service.db")]
    db_path: PathBuf,

    /// Path to an optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).context("failed to load config file")?,
        None => Config::default(),
    };

    let db_path_str = args
        .db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("database path must be valid UTF-8"))?;
    let db = Database::open(db_path_str)
        .await
        .context("failed to open database")?;

    let service = ArticlesService::new(
        Arc::new(ReqwestFetcher::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_feed_size_bytes,
        )),
        Arc::new(InMemoryCacheStore::new()),
        Arc::new(SqliteFieldStore::new(db.clone())),
        Arc::new(SqliteComparisonRegistry::new(db)),
        config,
    );

    let articles = service
        .fetch_feed_articles(&args.feed_url, &DefaultFlattener)
        .await
        .context("failed to fetch feed articles")?;

    println!("Resolved {} articles from {}", articles.len(), args.feed_url);
    for article in &articles {
        println!(
            "- {} ({})",
            article.title().unwrap_or("<untitled>"),
            article.id_hash
        );
    }

    Ok(())
}
