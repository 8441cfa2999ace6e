use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Facebook group posts scraper output ---

/// A single Facebook group post as emitted by the Apify groups scraper.
///
/// Every field is optional: scraper output is not trusted and gets validated
/// when converted into a domain post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookGroupPost {
    /// Numeric post id; the stable external identifier.
    #[serde(default)]
    pub legacy_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub facebook_url: Option<String>,
    /// ISO timestamp of publication.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub user: Option<FacebookUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<FacebookAttachment>>,
    /// Id of the group the post was published in.
    #[serde(default)]
    pub facebook_id: Option<String>,
    #[serde(default)]
    pub group_title: Option<String>,
    #[serde(default)]
    pub likes_count: Option<i64>,
    #[serde(default)]
    pub shares_count: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub input_url: Option<String>,
    /// Some actor configurations surface an explicit contact number.
    #[serde(default)]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacebookUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookAttachment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub image: Option<FacebookImage>,
    #[serde(default)]
    pub ocr_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacebookImage {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

impl FacebookAttachment {
    /// The image URI, if this attachment carries a non-empty one.
    pub fn image_uri(&self) -> Option<&str> {
        self.image
            .as_ref()
            .and_then(|i| i.uri.as_deref())
            .filter(|u| !u.is_empty())
    }
}

// --- Run / webhook payloads ---

/// Apify actor run metadata, as returned by the runs API and embedded as
/// `resource` in run webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "defaultDatasetId", default)]
    pub default_dataset_id: Option<String>,
    #[serde(rename = "startedAt", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt", default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunData {
    /// Dataset id, treating blank strings as absent.
    pub fn dataset_id(&self) -> Option<&str> {
        self.default_dataset_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_scraper_item() {
        let json = r#"{
            "legacyId": "1234567890",
            "url": "https://www.facebook.com/groups/1/posts/1234567890/",
            "time": "2025-05-01T08:30:00.000Z",
            "user": { "id": "u-1", "name": "Lan Nguyen" },
            "text": "Phòng 2tr5 Cầu Giấy",
            "attachments": [
                { "__typename": "Photo", "image": { "uri": "https://cdn/1.jpg", "height": 720, "width": 960 } },
                { "__typename": "Video" }
            ],
            "facebookId": "group-42",
            "groupTitle": "Phòng trọ Hà Nội",
            "likesCount": 3
        }"#;

        let post: FacebookGroupPost = serde_json::from_str(json).unwrap();
        assert_eq!(post.legacy_id.as_deref(), Some("1234567890"));
        assert_eq!(post.user.as_ref().unwrap().name.as_deref(), Some("Lan Nguyen"));
        assert_eq!(post.facebook_id.as_deref(), Some("group-42"));

        let attachments = post.attachments.unwrap();
        assert_eq!(attachments[0].image_uri(), Some("https://cdn/1.jpg"));
        assert_eq!(attachments[1].image_uri(), None);
    }

    #[test]
    fn tolerates_sparse_items() {
        let post: FacebookGroupPost = serde_json::from_str("{}").unwrap();
        assert!(post.legacy_id.is_none());
        assert!(post.text.is_none());
    }

    #[test]
    fn run_data_blank_dataset_is_absent() {
        let run: RunData = serde_json::from_str(r#"{"defaultDatasetId": "  "}"#).unwrap();
        assert_eq!(run.dataset_id(), None);

        let run: RunData =
            serde_json::from_str(r#"{"id": "r1", "defaultDatasetId": "ds-9"}"#).unwrap();
        assert_eq!(run.dataset_id(), Some("ds-9"));
    }
}
