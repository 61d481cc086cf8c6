//! `fetch_feed_article` and `fetch_random_feed_article`: single-article
//! lookups layered over a single `fetch_feed_articles` call, so a lookup
//! never costs a second network round trip.

use rand::seq::SliceRandom;

use crate::error::ServiceError;
use crate::model::Article;

pub fn fetch_feed_article(articles: &[Article], id_hash: &str) -> Result<Article, ServiceError> {
    articles
        .iter()
        .find(|a| a.id_hash == id_hash)
        .cloned()
        .ok_or(ServiceError::FeedArticleNotFound)
}

/// Unlike `fetch_feed_article`, an empty feed is not an error here — the
/// specification defines this lookup as returning `None` on an empty list
/// rather than `FeedArticleNotFound`.
pub fn fetch_random_feed_article(articles: &[Article]) -> Option<Article> {
    articles.choose(&mut rand::thread_rng()).cloned()
}
