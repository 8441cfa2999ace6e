use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Raw posts ---

/// A validated social post describing a room for rent.
///
/// Built once at the ingestion boundary from scraper output and never mutated
/// afterwards. Serialized field names follow the scraper's camelCase so the
/// stored provenance payload stays recognisable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    /// External identifier, unique per source.
    pub legacy_id: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub user: Option<Author>,
    /// Origin group identifier.
    #[serde(rename = "facebookId", default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub group_title: Option<String>,
    #[serde(rename = "time", default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Permalink.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub image_uri: Option<String>,
}

impl RawPost {
    pub fn author_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn author_name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.name.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn group_title(&self) -> Option<&str> {
        self.group_title.as_deref().filter(|s| !s.is_empty())
    }

    pub fn permalink(&self) -> Option<&str> {
        self.url.as_deref().filter(|s| !s.is_empty())
    }

    pub fn contact_phone(&self) -> Option<&str> {
        self.contact_phone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Image URIs of all attachments that carry one, in attachment order.
    pub fn image_uris(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter_map(|a| a.image_uri.as_deref())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn first_image_uri(&self) -> Option<&str> {
        self.attachments
            .iter()
            .filter_map(|a| a.image_uri.as_deref())
            .find(|u| !u.is_empty())
    }
}

/// The raw post plus both fingerprints, stored with every listing so later
/// batches can be checked against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    #[serde(flatten)]
    pub post: RawPost,
    pub content_hash: String,
    pub similarity_hash: String,
}

/// Keys inside the provenance payload that duplicate lookups can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvenanceField {
    ContentHash,
    SimilarityHash,
}

impl ProvenanceField {
    /// JSON key inside the stored payload.
    pub fn json_key(&self) -> &'static str {
        match self {
            ProvenanceField::ContentHash => "contentHash",
            ProvenanceField::SimilarityHash => "similarityHash",
        }
    }
}

impl fmt::Display for ProvenanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_key())
    }
}

// --- Listings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Shared,
    Apartment,
    Studio,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Single => "single",
            RoomType::Shared => "shared",
            RoomType::Apartment => "apartment",
            RoomType::Studio => "studio",
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(RoomType::Single),
            "shared" => Ok(RoomType::Shared),
            "apartment" => Ok(RoomType::Apartment),
            "studio" => Ok(RoomType::Studio),
            other => Err(format!("unknown room type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilities {
    #[serde(default)]
    pub electricity: Option<String>,
    #[serde(default)]
    pub water: Option<String>,
    #[serde(default)]
    pub internet: Option<bool>,
    #[serde(default)]
    pub parking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedBy {
    pub name: String,
    pub fb_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl PostedBy {
    pub fn anonymous() -> Self {
        Self {
            name: "Anonymous".to_string(),
            fb_id: "unknown".to_string(),
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A persisted room listing, keyed by the post's external identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub address: String,
    pub district: String,
    pub ward: Option<String>,
    /// Monthly rent in VND.
    pub price: i64,
    /// Floor area in m².
    pub area: f64,
    pub posted_by: PostedBy,
    pub posted_at: DateTime<Utc>,
    pub fb_link: String,
    pub fb_group_name: String,
    pub coordinates: Option<Coordinates>,
    pub amenities: Vec<String>,
    pub rules: Vec<String>,
    pub images: Vec<String>,
    pub contact_phone: Option<String>,
    pub deposit_required: Option<i64>,
    pub utilities: Utilities,
    pub room_type: Option<RoomType>,
    pub available: bool,
    pub raw_fb_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create a listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub address: String,
    pub district: String,
    pub ward: Option<String>,
    pub price: i64,
    pub area: f64,
    pub posted_by: PostedBy,
    pub posted_at: DateTime<Utc>,
    pub fb_link: String,
    pub fb_group_name: String,
    pub coordinates: Option<Coordinates>,
    pub amenities: Vec<String>,
    pub rules: Vec<String>,
    pub images: Vec<String>,
    pub contact_phone: Option<String>,
    pub deposit_required: Option<i64>,
    pub utilities: Utilities,
    pub room_type: Option<RoomType>,
    pub available: bool,
    pub raw_fb_data: serde_json::Value,
}

/// The fields a repeated delivery of the same post may change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingUpdate {
    pub title: String,
    pub description: String,
    pub price: i64,
    pub available: bool,
    pub thumbnail: String,
    pub images: Vec<String>,
    pub raw_fb_data: serde_json::Value,
}

impl NewListing {
    /// The restricted update applied when the row already exists.
    pub fn update_fields(&self) -> ListingUpdate {
        ListingUpdate {
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price,
            available: self.available,
            thumbnail: self.thumbnail.clone(),
            images: self.images.clone(),
            raw_fb_data: self.raw_fb_data.clone(),
        }
    }

    /// Materialize as a stored row (used by in-memory stores).
    pub fn into_listing(self, now: DateTime<Utc>) -> Listing {
        Listing {
            id: self.id,
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail,
            address: self.address,
            district: self.district,
            ward: self.ward,
            price: self.price,
            area: self.area,
            posted_by: self.posted_by,
            posted_at: self.posted_at,
            fb_link: self.fb_link,
            fb_group_name: self.fb_group_name,
            coordinates: self.coordinates,
            amenities: self.amenities,
            rules: self.rules,
            images: self.images,
            contact_phone: self.contact_phone,
            deposit_required: self.deposit_required,
            utilities: self.utilities,
            room_type: self.room_type,
            available: self.available,
            raw_fb_data: self.raw_fb_data,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Listing {
    /// Apply a restricted update in place (used by in-memory stores).
    pub fn apply_update(&mut self, update: &ListingUpdate, now: DateTime<Utc>) {
        self.title = update.title.clone();
        self.description = update.description.clone();
        self.price = update.price;
        self.available = update.available;
        self.thumbnail = update.thumbnail.clone();
        self.images = update.images.clone();
        self.raw_fb_data = update.raw_fb_data.clone();
        self.updated_at = now;
    }
}

/// Which write a create-or-update performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

// --- Validation ---

/// Which extracted fields are mandatory before a post may be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// A title or a non-zero price is enough.
    #[default]
    Lenient,
    /// Both a title and a non-zero price are required.
    Strict,
}

impl ValidationMode {
    pub fn accepts(&self, title: Option<&str>, price: Option<i64>) -> bool {
        let has_title = title.is_some_and(|t| !t.trim().is_empty());
        let has_price = price.is_some_and(|p| p != 0);
        match self {
            ValidationMode::Lenient => has_title || has_price,
            ValidationMode::Strict => has_title && has_price,
        }
    }

    /// Reason recorded when [`accepts`](Self::accepts) fails.
    pub fn rejection_reason(&self) -> &'static str {
        match self {
            ValidationMode::Lenient => "Missing both title and price - likely not a room post",
            ValidationMode::Strict => "Missing required fields: title or price",
        }
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(ValidationMode::Lenient),
            "strict" => Ok(ValidationMode::Strict),
            other => Err(format!("unknown validation mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> RawPost {
        RawPost {
            legacy_id: "p1".into(),
            text: "Phòng 2tr5 Cầu Giấy".into(),
            attachments: vec![
                Attachment { image_uri: None },
                Attachment {
                    image_uri: Some("https://cdn/a.jpg".into()),
                },
                Attachment {
                    image_uri: Some("https://cdn/b.jpg".into()),
                },
            ],
            user: Some(Author {
                id: Some("u1".into()),
                name: Some("Lan".into()),
            }),
            group_id: Some("g1".into()),
            group_title: Some("Phòng trọ Hà Nội".into()),
            published_at: None,
            url: None,
            contact_phone: Some("  ".into()),
        }
    }

    #[test]
    fn image_helpers_skip_attachments_without_images() {
        let p = post();
        assert_eq!(p.first_image_uri(), Some("https://cdn/a.jpg"));
        assert_eq!(p.image_uris(), vec!["https://cdn/a.jpg", "https://cdn/b.jpg"]);
    }

    #[test]
    fn blank_contact_phone_is_absent() {
        assert_eq!(post().contact_phone(), None);
    }

    #[test]
    fn provenance_flattens_post_and_names_hashes() {
        let prov = Provenance {
            post: post(),
            content_hash: "c".into(),
            similarity_hash: "s".into(),
        };
        let value = serde_json::to_value(&prov).unwrap();
        assert_eq!(value["legacyId"], "p1");
        assert_eq!(value["facebookId"], "g1");
        assert_eq!(value[ProvenanceField::ContentHash.json_key()], "c");
        assert_eq!(value[ProvenanceField::SimilarityHash.json_key()], "s");
    }

    #[test]
    fn room_type_parses_case_insensitively() {
        assert_eq!("Studio".parse::<RoomType>(), Ok(RoomType::Studio));
        assert!("penthouse".parse::<RoomType>().is_err());
    }

    #[test]
    fn lenient_mode_needs_title_or_price() {
        let mode = ValidationMode::Lenient;
        assert!(mode.accepts(Some("Phòng đẹp"), None));
        assert!(mode.accepts(None, Some(2_500_000)));
        assert!(!mode.accepts(Some("   "), Some(0)));
        assert!(!mode.accepts(None, None));
    }

    #[test]
    fn strict_mode_needs_title_and_price() {
        let mode = ValidationMode::Strict;
        assert!(mode.accepts(Some("Phòng đẹp"), Some(2_500_000)));
        assert!(!mode.accepts(Some("Phòng đẹp"), None));
        assert!(!mode.accepts(None, Some(2_500_000)));
    }
}
