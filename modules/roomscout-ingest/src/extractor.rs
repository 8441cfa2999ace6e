//! Extraction client: one post in, one [`ExtractionOutcome`] out.
//!
//! Wraps the completion capability with input validation, rate-limit aware
//! exponential backoff, tolerant decoding of the model's JSON, and the merge
//! with post metadata. Recoverable failures never escape as errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::{
    preview, strip_code_blocks, CompletionOptions, JsonMode, StructuredOutput,
    TextCompletion,
};
use roomscout_common::{PostedBy, RawPost, RoomScoutError, RoomType, Utilities, ValidationMode};

use crate::config::ExtractionConfig;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that extracts structured data from Vietnamese hostel posts.";

// --- Model output ---

/// Listing fields as returned by the model.
///
/// Every field decodes leniently: numbers may arrive as strings or floats,
/// lists may arrive as null, and anything unrecognisable becomes absent
/// instead of failing the whole post.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedListing {
    /// Short title of the room.
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ward: Option<String>,
    /// Monthly rent in VND ("3tr" is 3000000, "2tr5" is 2500000).
    #[serde(default, deserialize_with = "lenient::integer")]
    pub price: Option<i64>,
    /// Floor area in m².
    #[serde(default, deserialize_with = "lenient::float")]
    pub area: Option<f64>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub amenities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub rules: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub contact_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub deposit_required: Option<i64>,
    #[serde(default)]
    pub utilities: Option<ExtractedUtilities>,
    /// One of single, shared, apartment, studio.
    #[serde(default, deserialize_with = "lenient::string")]
    pub room_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExtractedUtilities {
    #[serde(default, deserialize_with = "lenient::string")]
    pub electricity: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub water: Option<String>,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub internet: Option<bool>,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub parking: Option<bool>,
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let amount = match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => vnd_amount(&s),
            _ => None,
        };
        Ok(amount.filter(|v| *v >= 0))
    }

    /// A single amount written the way posts write it: "2.500.000đ",
    /// "2,5 triệu", "2tr5", "500k". Ranges and negative amounts are absent.
    pub(super) fn vnd_amount(raw: &str) -> Option<i64> {
        let s = raw.trim().to_lowercase();
        let start = s.find(|c: char| c.is_ascii_digit())?;
        if s[..start].trim_end().ends_with('-') {
            return None;
        }

        let rest = &s[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
            .unwrap_or(rest.len());
        let number = rest[..end].trim_end_matches(['.', ',']);
        let tail = rest[end..].trim_start();

        let (value, remainder) = if let Some((unit, after)) = multiplier(tail) {
            // "2tr5" carries the fractional million after the unit.
            let fraction_len = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
            let fraction = &after[..fraction_len];
            let whole: f64 = number.replace(',', ".").parse().ok()?;
            let fraction: f64 = if fraction.is_empty() || number.contains(['.', ',']) {
                0.0
            } else {
                format!("0.{fraction}").parse().ok()?
            };
            (((whole + fraction) * unit).round() as i64, &after[fraction_len..])
        } else {
            (plain_number(number)?, tail)
        };

        // A second number means a range or a list, not one amount.
        if remainder.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(value)
    }

    fn multiplier(tail: &str) -> Option<(f64, &str)> {
        for (unit, factor) in [("triệu", 1_000_000.0), ("tr", 1_000_000.0), ("k", 1_000.0)] {
            if let Some(after) = tail.strip_prefix(unit) {
                if !after.starts_with(char::is_alphabetic) {
                    return Some((factor, after));
                }
            }
        }
        None
    }

    /// Groups of exactly three digits after a separator are thousands;
    /// a single other group is a decimal part.
    fn plain_number(number: &str) -> Option<i64> {
        let groups: Vec<&str> = number.split(['.', ',']).collect();
        if groups.iter().skip(1).all(|g| g.len() == 3) {
            return groups.concat().parse().ok();
        }
        match groups.as_slice() {
            [whole, decimal] => format!("{whole}.{decimal}")
                .parse::<f64>()
                .ok()
                .map(|f| f.round() as i64),
            _ => None,
        }
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let numeric: String = s
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                numeric.parse().ok()
            }
            _ => None,
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "có" => Some(true),
                "false" | "no" | "không" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                    _ => None,
                })
                .collect(),
            Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        })
    }
}

// --- Merged result ---

/// Extracted fields merged with metadata taken from the post itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub district: Option<String>,
    pub ward: Option<String>,
    pub price: Option<i64>,
    pub area: Option<f64>,
    pub amenities: Vec<String>,
    pub rules: Vec<String>,
    pub contact_phone: Option<String>,
    pub deposit_required: Option<i64>,
    pub utilities: Utilities,
    pub room_type: Option<RoomType>,
    /// Attachment images in order; the first doubles as thumbnail.
    pub images: Vec<String>,
    pub posted_by: PostedBy,
    pub posted_at: Option<DateTime<Utc>>,
    pub fb_link: String,
    pub fb_group_name: String,
}

impl ListingFields {
    pub fn merge(extracted: ExtractedListing, post: &RawPost) -> Self {
        let utilities = extracted
            .utilities
            .map(|u| Utilities {
                electricity: u.electricity,
                water: u.water,
                internet: u.internet,
                parking: u.parking,
            })
            .unwrap_or_default();

        Self {
            title: extracted.title,
            description: extracted.description,
            address: extracted.address,
            district: extracted.district,
            ward: extracted.ward,
            price: extracted.price,
            area: extracted.area,
            amenities: extracted.amenities,
            rules: extracted.rules,
            contact_phone: extracted
                .contact_phone
                .or_else(|| post.contact_phone().map(str::to_string)),
            deposit_required: extracted.deposit_required,
            utilities,
            room_type: extracted.room_type.and_then(|r| r.parse().ok()),
            images: post.image_uris(),
            posted_by: PostedBy {
                name: post.author_name().unwrap_or("Anonymous").to_string(),
                fb_id: post.author_id().unwrap_or("unknown").to_string(),
                avatar: None,
            },
            posted_at: post.published_at,
            fb_link: post.permalink().unwrap_or_default().to_string(),
            fb_group_name: post.group_title().unwrap_or_default().to_string(),
        }
    }

    pub fn satisfies(&self, mode: ValidationMode) -> bool {
        mode.accepts(self.title.as_deref(), self.price)
    }
}

/// Result of extracting one post. Always one of the two shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Accepted { fields: Box<ListingFields> },
    Rejected { reason: String },
}

impl ExtractionOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ExtractionOutcome::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ExtractionOutcome::Accepted { .. })
    }
}

// --- PostExtractor trait ---

#[async_trait]
pub trait PostExtractor: Send + Sync {
    async fn extract(&self, post: &RawPost) -> ExtractionOutcome;
}

pub struct ListingExtractor {
    completion: Arc<dyn TextCompletion>,
    config: ExtractionConfig,
    mode: ValidationMode,
}

impl ListingExtractor {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        config: ExtractionConfig,
        mode: ValidationMode,
    ) -> Self {
        Self {
            completion,
            config,
            mode,
        }
    }

    fn options(&self) -> CompletionOptions {
        let json_mode = if self.config.json_schema {
            ExtractedListing::json_mode()
        } else {
            JsonMode::Object
        };
        CompletionOptions::json(self.config.temperature).with_json_mode(json_mode)
    }

    async fn try_extract(&self, post: &RawPost) -> Result<ListingFields, RoomScoutError> {
        if post.text.trim().is_empty() {
            return Err(RoomScoutError::Validation("empty text".to_string()));
        }

        let prompt = build_prompt(post);
        let raw = self.complete_with_backoff(&post.legacy_id, &prompt).await?;
        let extracted = parse_extraction(&raw)?;
        let fields = ListingFields::merge(extracted, post);

        if !fields.satisfies(self.mode) {
            return Err(RoomScoutError::Validation(
                self.mode.rejection_reason().to_string(),
            ));
        }
        Ok(fields)
    }

    async fn complete_with_backoff(
        &self,
        legacy_id: &str,
        prompt: &str,
    ) -> Result<String, RoomScoutError> {
        let options = self.options();
        let mut attempt: u32 = 0;
        loop {
            match self.completion.complete(SYSTEM_PROMPT, prompt, &options).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limited() => {
                    if attempt >= self.config.max_retries {
                        warn!(legacy_id, attempts = attempt + 1, "Rate limit retries exhausted");
                        return Err(RoomScoutError::RateLimit("rate limit exceeded".to_string()));
                    }
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        legacy_id,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(RoomScoutError::Transport(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl PostExtractor for ListingExtractor {
    async fn extract(&self, post: &RawPost) -> ExtractionOutcome {
        match self.try_extract(post).await {
            Ok(fields) => {
                debug!(legacy_id = %post.legacy_id, "Extraction accepted");
                ExtractionOutcome::Accepted {
                    fields: Box::new(fields),
                }
            }
            Err(e) => {
                warn!(legacy_id = %post.legacy_id, error = %e, "Extraction rejected");
                ExtractionOutcome::rejected(e.detail())
            }
        }
    }
}

/// `base * 2^attempt`, saturating.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Decode the model output, tolerating markdown code fences.
pub fn parse_extraction(raw: &str) -> Result<ExtractedListing, RoomScoutError> {
    let body = strip_code_blocks(raw);
    serde_json::from_str(body).map_err(|e| {
        debug!(raw = %preview(body, 200), "Unparseable extraction response");
        RoomScoutError::Transport(format!("Invalid extraction response: {e}"))
    })
}

pub fn build_prompt(post: &RawPost) -> String {
    format!(
        r#"Bạn là một AI chuyên trích xuất thông tin từ bài đăng phòng trọ trên Facebook.

Dữ liệu đầu vào:
- Nội dung: {text}
- Tên nhóm: {group}
- Người đăng: {author}
- Link: {link}

Hãy trích xuất thông tin sau và trả về JSON:
{{
  "title": "Tiêu đề ngắn gọn của phòng trọ",
  "description": "Mô tả chi tiết",
  "address": "Địa chỉ cụ thể",
  "district": "Quận/Huyện",
  "ward": "Phường/Xã (nếu có)",
  "price": số tiền (VNĐ),
  "area": diện tích (m²) hoặc 0 nếu không có,
  "amenities": ["tiện nghi 1", "tiện nghi 2"],
  "rules": ["quy định 1", "quy định 2"],
  "contactPhone": "số điện thoại",
  "depositRequired": số tiền đặt cọc (VNĐ) hoặc null,
  "utilities": {{
    "electricity": "giá điện hoặc null",
    "water": "giá nước hoặc null",
    "internet": true/false,
    "parking": true/false
  }},
  "roomType": "single" | "shared" | "apartment" | "studio" | null
}}

Lưu ý:
- Nếu không tìm thấy thông tin, để null hoặc []
- Price luôn phải là số (VNĐ), nếu viết 3tr thì là 3000000, 2tr5 là 2500000
- Area là diện tích m²
- RoomType: single (phòng đơn), shared (phòng chung), apartment (căn hộ), studio
"#,
        text = post.text,
        group = post.group_title().unwrap_or("Unknown Group"),
        author = post.author_name().unwrap_or("Anonymous"),
        link = post.permalink().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use ai_client::AiError;

    use super::*;
    use crate::testing::{post, ScriptedCompletion};

    fn config(max_retries: u32) -> ExtractionConfig {
        ExtractionConfig {
            max_retries,
            retry_base_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn extractor(completion: Arc<ScriptedCompletion>, mode: ValidationMode) -> ListingExtractor {
        ListingExtractor::new(completion, config(3), mode)
    }

    const ROOM_JSON: &str = r#"{"title":"Phòng 2tr5 Cầu Giấy","price":2500000,"district":"Cầu Giấy","roomType":"studio"}"#;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(2000);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(8000));
        assert_eq!(backoff_delay(base, 40), Duration::from_millis(2000).saturating_mul(u32::MAX));
    }

    #[test]
    fn lenient_decoding_accepts_strings_floats_and_nulls() {
        let parsed = parse_extraction(
            r#"```json
{"title":"  Phòng đẹp ","price":"2.500.000","area":"25,5 m2","amenities":null,
 "rules":["Không nuôi thú",3],"depositRequired":1500000.0,"roomType":"penthouse",
 "utilities":{"electricity":3500,"internet":"có","parking":null}}
```"#,
        )
        .unwrap();

        assert_eq!(parsed.title.as_deref(), Some("Phòng đẹp"));
        assert_eq!(parsed.price, Some(2_500_000));
        assert_eq!(parsed.area, Some(25.5));
        assert!(parsed.amenities.is_empty());
        assert_eq!(parsed.rules, vec!["Không nuôi thú"]);
        assert_eq!(parsed.deposit_required, Some(1_500_000));
        let utilities = parsed.utilities.unwrap();
        assert_eq!(utilities.electricity.as_deref(), Some("3500"));
        assert_eq!(utilities.internet, Some(true));
        assert_eq!(utilities.parking, None);
    }

    #[test]
    fn amounts_are_read_the_way_posts_write_them() {
        use super::lenient::vnd_amount;

        assert_eq!(vnd_amount("2.500.000đ"), Some(2_500_000));
        assert_eq!(vnd_amount("2,500,000 VND/tháng"), Some(2_500_000));
        assert_eq!(vnd_amount("3tr"), Some(3_000_000));
        assert_eq!(vnd_amount("2tr5"), Some(2_500_000));
        assert_eq!(vnd_amount("2.5tr"), Some(2_500_000));
        assert_eq!(vnd_amount("khoảng 2,5 triệu"), Some(2_500_000));
        assert_eq!(vnd_amount("500k"), Some(500_000));
        assert_eq!(vnd_amount("1500000.0"), Some(1_500_000));
    }

    #[test]
    fn ranges_and_negative_amounts_are_absent() {
        let parsed = parse_extraction(
            r#"{"price":"3.000.000 - 3.500.000","depositRequired":"-1500000"}"#,
        )
        .unwrap();
        assert_eq!(parsed.price, None);
        assert_eq!(parsed.deposit_required, None);

        let parsed = parse_extraction(r#"{"price":"3-3.5tr","depositRequired":-200}"#).unwrap();
        assert_eq!(parsed.price, None);
        assert_eq!(parsed.deposit_required, None);
    }

    #[test]
    fn malformed_response_is_a_transport_error() {
        let err = parse_extraction("not json at all").unwrap_err();
        assert!(matches!(err, RoomScoutError::Transport(_)));
    }

    #[test]
    fn unknown_room_type_is_absent_after_merge() {
        let extracted = parse_extraction(r#"{"title":"x","roomType":"penthouse"}"#).unwrap();
        let fields = ListingFields::merge(extracted, &post("p1", "phòng"));
        assert_eq!(fields.room_type, None);
    }

    #[test]
    fn merge_takes_metadata_from_post() {
        let mut p = post("p1", "phòng");
        p.user = None;
        p.contact_phone = Some("0900000000".into());
        let fields = ListingFields::merge(parse_extraction(ROOM_JSON).unwrap(), &p);

        assert_eq!(fields.posted_by, PostedBy::anonymous());
        assert_eq!(fields.images, p.image_uris());
        assert_eq!(fields.contact_phone.as_deref(), Some("0900000000"));
        assert_eq!(fields.room_type, Some(RoomType::Studio));
    }

    #[test]
    fn prompt_embeds_post_context() {
        let mut p = post("p1", "Phòng 2tr5 Cầu Giấy");
        p.url = Some("https://fb/p1".into());
        let prompt = build_prompt(&p);
        assert!(prompt.contains("- Nội dung: Phòng 2tr5 Cầu Giấy"));
        assert!(prompt.contains("- Link: https://fb/p1"));
        assert!(prompt.contains("2tr5 là 2500000"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_calling_the_model() {
        let completion = Arc::new(ScriptedCompletion::new());
        let outcome = extractor(completion.clone(), ValidationMode::Lenient)
            .extract(&post("p1", "   "))
            .await;
        assert_eq!(outcome, ExtractionOutcome::rejected("empty text"));
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limit_then_success_is_accepted() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .then_err(AiError::RateLimited("slow down".into()))
                .then_err(AiError::RateLimited("slow down".into()))
                .then_ok(ROOM_JSON),
        );
        let outcome = extractor(completion.clone(), ValidationMode::Lenient)
            .extract(&post("p1", "phòng 2tr5 Cầu Giấy"))
            .await;

        assert!(outcome.is_accepted());
        assert_eq!(completion.calls(), 3);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_is_rejected() {
        let completion = Arc::new(ScriptedCompletion::always_err(|| {
            AiError::RateLimited("slow down".into())
        }));
        let ex = ListingExtractor::new(completion.clone(), config(2), ValidationMode::Lenient);
        let outcome = ex.extract(&post("p1", "phòng")).await;

        assert_eq!(outcome, ExtractionOutcome::rejected("rate limit exceeded"));
        assert_eq!(completion.calls(), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let completion = Arc::new(ScriptedCompletion::new().then_err(AiError::Api {
            status: 500,
            message: "boom".into(),
        }));
        let outcome = extractor(completion.clone(), ValidationMode::Lenient)
            .extract(&post("p1", "phòng"))
            .await;

        match outcome {
            ExtractionOutcome::Rejected { reason } => assert!(reason.contains("boom")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn lenient_mode_accepts_title_without_price() {
        let completion = Arc::new(ScriptedCompletion::new().then_ok(r#"{"title":"Phòng đẹp"}"#));
        let outcome = extractor(completion, ValidationMode::Lenient)
            .extract(&post("p1", "phòng đẹp"))
            .await;
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn strict_mode_requires_title_and_price() {
        let completion = Arc::new(ScriptedCompletion::new().then_ok(r#"{"title":"Phòng đẹp"}"#));
        let outcome = extractor(completion, ValidationMode::Strict)
            .extract(&post("p1", "phòng đẹp"))
            .await;
        assert_eq!(
            outcome,
            ExtractionOutcome::rejected(ValidationMode::Strict.rejection_reason())
        );
    }

    #[tokio::test]
    async fn schema_mode_sends_extraction_schema() {
        let completion = Arc::new(ScriptedCompletion::new().then_ok(ROOM_JSON));
        let ex = ListingExtractor::new(
            completion.clone(),
            ExtractionConfig {
                json_schema: true,
                ..config(0)
            },
            ValidationMode::Lenient,
        );
        ex.extract(&post("p1", "phòng")).await;

        let options = completion.last_options().unwrap();
        assert!(matches!(options.json_mode, JsonMode::Schema { .. }));
        assert!((options.temperature - 0.3).abs() < f32::EPSILON);
    }
}
