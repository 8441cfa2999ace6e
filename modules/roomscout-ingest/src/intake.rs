//! Validation at the ingestion boundary: untrusted scraper items in, domain
//! posts out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use apify_client::FacebookGroupPost;
use roomscout_common::{Attachment, Author, RawPost};

/// An item dropped at intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedItem {
    #[serde(rename = "fbPostId")]
    pub legacy_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Intake {
    /// Number of items received, valid or not.
    pub total: usize,
    pub posts: Vec<RawPost>,
    pub dropped: Vec<DroppedItem>,
}

/// Convert scraper items into posts, dropping those without an external
/// identifier or with blank text. Dataset order is preserved.
pub fn validate_items(items: Vec<FacebookGroupPost>) -> Intake {
    collect(items.into_iter().map(to_raw_post))
}

/// Like [`validate_items`], for items still in their raw JSON form. An item
/// that does not decode as a scraper post is dropped on its own.
pub fn decode_items(items: Vec<Value>) -> Intake {
    collect(items.into_iter().map(|value| {
        match serde_json::from_value::<FacebookGroupPost>(value.clone()) {
            Ok(item) => to_raw_post(item),
            Err(e) => Err(DroppedItem {
                legacy_id: raw_legacy_id(&value),
                reason: format!("Invalid item: {e}"),
            }),
        }
    }))
}

fn collect(results: impl ExactSizeIterator<Item = Result<RawPost, DroppedItem>>) -> Intake {
    let total = results.len();
    let mut posts = Vec::with_capacity(total);
    let mut dropped = Vec::new();

    for result in results {
        match result {
            Ok(post) => posts.push(post),
            Err(skip) => {
                debug!(legacy_id = %skip.legacy_id, reason = %skip.reason, "Skipping invalid post");
                dropped.push(skip);
            }
        }
    }

    Intake {
        total,
        posts,
        dropped,
    }
}

fn raw_legacy_id(value: &Value) -> String {
    match value.get("legacyId") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "unknown".to_string(),
    }
}

fn to_raw_post(item: FacebookGroupPost) -> Result<RawPost, DroppedItem> {
    let legacy_id = match non_blank(item.legacy_id) {
        Some(id) => id,
        None => {
            return Err(DroppedItem {
                legacy_id: "unknown".to_string(),
                reason: "Missing legacyId".to_string(),
            })
        }
    };

    let text = match item.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(DroppedItem {
                legacy_id,
                reason: "Post text is empty".to_string(),
            })
        }
    };

    let attachments = item
        .attachments
        .unwrap_or_default()
        .iter()
        .map(|a| Attachment {
            image_uri: a.image_uri().map(str::to_string),
        })
        .collect();

    let user = item.user.map(|u| Author {
        id: non_blank(u.id),
        name: non_blank(u.name),
    });

    Ok(RawPost {
        legacy_id,
        text,
        attachments,
        user,
        group_id: non_blank(item.facebook_id),
        group_title: non_blank(item.group_title),
        published_at: item.time.as_deref().and_then(parse_time),
        url: non_blank(item.url),
        contact_phone: non_blank(item.contact_phone),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            debug!(raw, error = %e, "Unparseable post timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use apify_client::{FacebookAttachment, FacebookImage, FacebookUser};

    use super::*;

    fn item(legacy_id: Option<&str>, text: Option<&str>) -> FacebookGroupPost {
        FacebookGroupPost {
            legacy_id: legacy_id.map(str::to_string),
            text: text.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn drops_items_without_id_or_text() {
        let intake = validate_items(vec![
            item(Some("p1"), Some("phòng đẹp")),
            item(None, Some("phòng đẹp")),
            item(Some("p3"), Some("   ")),
            item(Some("  "), None),
        ]);

        assert_eq!(intake.total, 4);
        assert_eq!(intake.posts.len(), 1);
        assert_eq!(intake.posts[0].legacy_id, "p1");
        assert_eq!(intake.dropped.len(), 3);
        assert_eq!(intake.dropped[1].legacy_id, "p3");
        assert_eq!(intake.dropped[1].reason, "Post text is empty");
    }

    #[test]
    fn maps_scraper_fields() {
        let raw = FacebookGroupPost {
            legacy_id: Some("p1".into()),
            text: Some("Phòng 2tr5".into()),
            url: Some("https://fb/p1".into()),
            time: Some("2025-05-01T08:30:00.000Z".into()),
            user: Some(FacebookUser {
                id: Some("u1".into()),
                name: Some("".into()),
            }),
            attachments: Some(vec![
                FacebookAttachment::default(),
                FacebookAttachment {
                    image: Some(FacebookImage {
                        uri: Some("https://cdn/1.jpg".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            facebook_id: Some("g1".into()),
            group_title: Some("Phòng trọ Hà Nội".into()),
            ..Default::default()
        };

        let post = validate_items(vec![raw]).posts.remove(0);
        assert_eq!(post.author_id(), Some("u1"));
        assert_eq!(post.author_name(), None);
        assert_eq!(post.group_id(), Some("g1"));
        assert_eq!(post.first_image_uri(), Some("https://cdn/1.jpg"));
        assert_eq!(post.attachments.len(), 2);
        assert_eq!(
            post.published_at.map(|t| t.to_rfc3339()),
            Some("2025-05-01T08:30:00+00:00".to_string())
        );
    }

    #[test]
    fn malformed_item_is_dropped_alone() {
        let intake = decode_items(vec![
            serde_json::json!({ "legacyId": "p1", "text": "phòng đẹp" }),
            serde_json::json!({ "legacyId": 12345, "text": "phòng rẻ" }),
            serde_json::json!({ "legacyId": "p3", "text": "phòng mới", "attachments": "none" }),
            serde_json::json!("not an object"),
        ]);

        assert_eq!(intake.total, 4);
        assert_eq!(intake.posts.len(), 1);
        assert_eq!(intake.posts[0].legacy_id, "p1");
        let ids: Vec<&str> = intake.dropped.iter().map(|d| d.legacy_id.as_str()).collect();
        assert_eq!(ids, vec!["12345", "p3", "unknown"]);
        assert!(intake.dropped.iter().all(|d| d.reason.starts_with("Invalid item: ")));
    }

    #[test]
    fn bad_timestamp_becomes_absent() {
        let mut raw = item(Some("p1"), Some("phòng"));
        raw.time = Some("yesterday".into());
        let post = validate_items(vec![raw]).posts.remove(0);
        assert!(post.published_at.is_none());
    }
}
