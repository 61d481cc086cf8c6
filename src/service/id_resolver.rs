//! Picks a stable identity field for a whole batch of feed items.
//!
//! Grounded on `feed::parser::generate_guid`'s fallback chain (existing id,
//! else a composite of url/title/published), generalized into the explicit
//! four-way priority the specification calls for: `guid > pubdate > title >
//! link`. Unlike the teacher's version, the candidate is not hashed here —
//! hashing is ArticleBuilder's job (§4.C) so IdResolver stays a pure "which
//! field" decision that's independently testable.
//!
//! Spec §4.A: this is a *batch-wide* decision, not a per-item one. The
//! resolver observes which candidate is present and non-empty on every item
//! in the batch, then returns the single highest-priority survivor for the
//! whole batch — mixing fields across articles in the same feed would make
//! `id` (and therefore `id_hash`) unstable across polls of the same feed.

use feed_rs::model::Entry;

use crate::error::ServiceError;

/// The four candidate fields, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    Guid,
    PubDate,
    Title,
    Link,
}

const PRIORITY: [IdField; 4] = [IdField::Guid, IdField::PubDate, IdField::Title, IdField::Link];

fn field_value(entry: &Entry, field: IdField) -> Option<String> {
    let raw = match field {
        IdField::Guid => Some(entry.id.clone()),
        IdField::PubDate => entry.published.map(|d| d.to_rfc3339()),
        IdField::Title => entry.title.as_ref().map(|t| t.content.clone()),
        IdField::Link => entry.links.first().map(|l| l.href.clone()),
    };
    non_empty(raw)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// First pass: pick the highest-priority field that is present and
/// non-empty on every entry in the batch. Errors with `NoIdType` if none
/// survives across all items (an empty batch trivially satisfies the
/// highest-priority candidate, since there's nothing to contradict it).
pub fn resolve_batch_id_field(entries: &[Entry]) -> Result<IdField, ServiceError> {
    for field in PRIORITY {
        if entries.iter().all(|e| field_value(e, field).is_some()) {
            return Ok(field);
        }
    }
    Err(ServiceError::NoIdType)
}

/// Second pass: stringify `field` for one entry, given the batch-wide choice
/// `resolve_batch_id_field` already made.
pub fn id_value(entry: &Entry, field: IdField) -> String {
    field_value(entry, field)
        .expect("field presence already verified for every item in the batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feed_rs::model::Link;

    fn blank_entry() -> Entry {
        Entry::default()
    }

    fn entry_with_guid(guid: &str) -> Entry {
        let mut e = blank_entry();
        e.id = guid.to_string();
        e
    }

    #[test]
    fn prefers_guid_when_present_on_every_item() {
        let entries = vec![entry_with_guid("a"), entry_with_guid("b")];
        assert_eq!(resolve_batch_id_field(&entries).unwrap(), IdField::Guid);
    }

    #[test]
    fn falls_back_to_pubdate_when_any_item_lacks_guid() {
        let mut a = blank_entry();
        a.id = String::new();
        a.published = Some(Utc::now());
        let mut b = blank_entry();
        b.id = "has-a-guid".to_string();
        b.published = Some(Utc::now());

        // "a" has no guid, so guid can't be the batch-wide field even though
        // "b" has one.
        assert_eq!(
            resolve_batch_id_field(&[a, b]).unwrap(),
            IdField::PubDate
        );
    }

    #[test]
    fn falls_back_to_title_then_link() {
        let mut a = blank_entry();
        a.links.push(Link {
            href: "https://example.com/a".to_string(),
            rel: None,
            media_type: None,
            href_lang: None,
            title: None,
            length: None,
        });
        let mut b = blank_entry();
        b.links.push(Link {
            href: "https://example.com/b".to_string(),
            rel: None,
            media_type: None,
            href_lang: None,
            title: None,
            length: None,
        });

        let field = resolve_batch_id_field(&[a.clone(), b]).unwrap();
        assert_eq!(field, IdField::Link);
        assert_eq!(id_value(&a, field), "https://example.com/a");
    }

    #[test]
    fn errors_when_no_candidate_survives_on_every_item() {
        let with_guid = entry_with_guid("has-one");
        let without_guid = blank_entry();
        assert!(matches!(
            resolve_batch_id_field(&[with_guid, without_guid]),
            Err(ServiceError::NoIdType)
        ));
    }

    #[test]
    fn empty_batch_does_not_error() {
        assert!(resolve_batch_id_field(&[]).is_ok());
    }
}
