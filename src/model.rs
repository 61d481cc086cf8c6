//! Data model shared by every service component.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable row identifier for a feed, matching the SQLite `feeds.id` affinity
/// used throughout the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(pub i64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single flattened field value. Feed content is untyped by nature (arbitrary
/// caller-supplied flattener output), so this is the Rust-native stand-in for
/// a dynamically-typed primitive map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Raw, unflattened timestamps carried alongside the flattened field map.
/// Kept separate because `pubdate` participates in IdResolver priority and in
/// delivery ordering, independent of whatever key the flattener gave it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDates {
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// A resolved article: the flattened field map, its raw dates, and the
/// id_hash computed by ArticleBuilder. Content injection (see
/// `service::article_builder::inject_content`) writes its result straight
/// into `flattened` under the `"content"` key rather than carrying a
/// separate closure field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub flattened: HashMap<String, FieldValue>,
    pub raw: RawDates,
    pub id_hash: String,
}

impl Article {
    pub fn title(&self) -> Option<&str> {
        self.flattened.get("title").and_then(FieldValue::as_str)
    }

    pub fn link(&self) -> Option<&str> {
        self.flattened.get("link").and_then(FieldValue::as_str)
    }
}

/// A persisted record that this feed has already seen an article whose
/// identity field hashed to `id_hash`. One row per (feed, id_hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFieldRow {
    pub feed_id: FeedId,
    pub id_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted evaluation of one comparison against one article, keyed by the
/// comparison's name and the hash of the field(s) it compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRegistryRow {
    pub feed_id: FeedId,
    pub comparison_key: String,
    pub field_hash: String,
    pub is_blocking: bool,
    pub created_at: DateTime<Utc>,
}

/// Declares whether a named comparison suppresses delivery (blocking) or
/// merely requires the article to have already passed it once (passing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonKind {
    Blocking,
    Passing,
}

/// A user-defined comparison: a name, a kind, and the field(s) whose value
/// feeds the comparison hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub key: String,
    pub kind: ComparisonKind,
    pub fields: Vec<String>,
}
