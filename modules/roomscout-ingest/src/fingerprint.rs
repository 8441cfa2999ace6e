//! Content and similarity fingerprints for raw posts.
//!
//! Both fingerprints are the first 16 bytes of a SHA-256 digest rendered as
//! 32 lowercase hex characters. They are identity keys stored in the listing
//! provenance payload, so the input layout must never change without a
//! backfill.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sha2::{Digest, Sha256};

use roomscout_common::{Provenance, RawPost};

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10,11}").expect("valid phone regex"));

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s+[^\n,]+").expect("valid address regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Heuristic phone number and street address pulled out of a post body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilarityKey {
    pub phone: String,
    pub address: String,
}

impl SimilarityKey {
    /// No phone and no address: the key says nothing about the physical room.
    pub fn is_empty(&self) -> bool {
        self.phone.is_empty() && self.address.is_empty()
    }
}

/// Strategy for pulling the similarity key out of post text.
pub trait SimilarityKeyExtractor: Send + Sync {
    fn extract(&self, text: &str) -> SimilarityKey;
}

/// First 10-11 digit run as the phone, first `digits + space + non-comma run`
/// as the address, both taken from the lowercased text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSimilarityKeys;

impl SimilarityKeyExtractor for RegexSimilarityKeys {
    fn extract(&self, text: &str) -> SimilarityKey {
        let lowered = text.to_lowercase();
        let phone = PHONE_RE
            .find(&lowered)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let address = ADDRESS_RE
            .find(&lowered)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        SimilarityKey { phone, address }
    }
}

/// Both fingerprints of one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub content: String,
    pub similarity: String,
    /// True when phone, address and group id are all empty, i.e. the
    /// similarity fingerprint is the digest of `||`.
    pub similarity_is_trivial: bool,
}

#[derive(Clone)]
pub struct Fingerprinter {
    keys: Arc<dyn SimilarityKeyExtractor>,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(Arc::new(RegexSimilarityKeys))
    }
}

impl Fingerprinter {
    pub fn new(keys: Arc<dyn SimilarityKeyExtractor>) -> Self {
        Self { keys }
    }

    pub fn fingerprint(&self, post: &RawPost) -> Fingerprints {
        let key = self.keys.extract(&post.text);
        let group_id = post.group_id().unwrap_or("");
        Fingerprints {
            content: content_fingerprint(post),
            similarity: similarity_digest(&key, group_id),
            similarity_is_trivial: key.is_empty() && group_id.is_empty(),
        }
    }

    /// The stored provenance payload: the raw post plus both fingerprints.
    pub fn provenance(&self, post: &RawPost) -> Provenance {
        let prints = self.fingerprint(post);
        Provenance {
            post: post.clone(),
            content_hash: prints.content,
            similarity_hash: prints.similarity,
        }
    }
}

/// Digest of `normalizedText|authorId|groupId|firstImageUri`.
///
/// Missing author or group become `unknown`, a missing image the empty string.
pub fn content_fingerprint(post: &RawPost) -> String {
    let input = format!(
        "{}|{}|{}|{}",
        normalize_text(&post.text),
        post.author_id().unwrap_or("unknown"),
        post.group_id().unwrap_or("unknown"),
        post.first_image_uri().unwrap_or(""),
    );
    digest(&input)
}

/// Similarity fingerprint using the default regex heuristics.
pub fn similarity_fingerprint(post: &RawPost) -> String {
    let key = RegexSimilarityKeys.extract(&post.text);
    similarity_digest(&key, post.group_id().unwrap_or(""))
}

fn similarity_digest(key: &SimilarityKey, group_id: &str) -> String {
    digest(&format!("{}|{}|{}", key.phone, key.address, group_id))
}

/// Lowercase, collapse whitespace runs, drop everything that is neither a
/// letter, a digit nor a space, then trim.
///
/// Letters are matched by Unicode class so Vietnamese diacritics survive.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = WHITESPACE_RE.replace_all(&lowered, " ");
    collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

fn digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..16])
}

#[cfg(test)]
mod tests {
    use roomscout_common::{Attachment, Author};

    use super::*;

    fn post(id: &str, text: &str) -> RawPost {
        RawPost {
            legacy_id: id.to_string(),
            text: text.to_string(),
            attachments: vec![Attachment {
                image_uri: Some("https://cdn/1.jpg".to_string()),
            }],
            user: Some(Author {
                id: Some("u1".to_string()),
                name: Some("Lan".to_string()),
            }),
            group_id: Some("g1".to_string()),
            group_title: None,
            published_at: None,
            url: None,
            contact_phone: None,
        }
    }

    #[test]
    fn normalize_keeps_vietnamese_letters() {
        assert_eq!(
            normalize_text("  Phòng   2tr5,\n Cầu Giấy!! "),
            "phòng 2tr5 cầu giấy"
        );
    }

    #[test]
    fn fingerprints_are_fixed_width_hex() {
        let prints = Fingerprinter::default().fingerprint(&post("p1", "phòng 2tr5"));
        assert_eq!(prints.content.len(), 32);
        assert_eq!(prints.similarity.len(), 32);
        assert!(prints.content.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let p = post("p1", "Phòng 2tr5 Cầu Giấy");
        let fp = Fingerprinter::default();
        assert_eq!(fp.fingerprint(&p), fp.fingerprint(&p));
    }

    #[test]
    fn content_fingerprint_ignores_identifier_and_formatting() {
        let a = post("p1", "Phòng đẹp,  giá rẻ!");
        let b = post("p2", "phòng ĐẸP giá rẻ");
        assert_eq!(content_fingerprint(&a), content_fingerprint(&b));
    }

    #[test]
    fn content_fingerprint_depends_on_author_and_image() {
        let a = post("p1", "phòng đẹp");
        let mut b = a.clone();
        b.user = None;
        assert_ne!(content_fingerprint(&a), content_fingerprint(&b));

        let mut c = a.clone();
        c.attachments.clear();
        assert_ne!(content_fingerprint(&a), content_fingerprint(&c));
    }

    #[test]
    fn regex_keys_find_phone_and_address() {
        let key = RegexSimilarityKeys.extract("Liên hệ 0912345678\n12 Trần Duy Hưng, Cầu Giấy");
        assert_eq!(key.phone, "0912345678");
        assert_eq!(key.address, "0912345678\n12 trần duy hưng");

        let key = RegexSimilarityKeys.extract("Phòng tại 12 trần duy hưng, cầu giấy");
        assert_eq!(key.phone, "");
        assert_eq!(key.address, "12 trần duy hưng");
    }

    #[test]
    fn similarity_is_trivial_only_when_all_three_fields_are_empty() {
        let mut groupless = post("p1", "phòng đẹp giá rẻ");
        groupless.group_id = None;
        assert!(Fingerprinter::default().fingerprint(&groupless).similarity_is_trivial);

        // A group alone still yields a usable key.
        let prints = Fingerprinter::default().fingerprint(&post("p1", "phòng đẹp giá rẻ"));
        assert!(!prints.similarity_is_trivial);

        groupless.text = "gọi 0912345678".to_string();
        assert!(!Fingerprinter::default().fingerprint(&groupless).similarity_is_trivial);
    }

    #[test]
    fn similarity_ignores_author_and_images() {
        let a = post("p1", "phòng 12 ngõ 5 láng hạ, gọi 0912345678");
        let mut b = post("p2", "Phòng 12 ngõ 5 Láng Hạ, gọi 0912345678 nhé");
        b.user = None;
        b.attachments.clear();
        assert_eq!(similarity_fingerprint(&a), similarity_fingerprint(&b));
    }

    struct FixedKeys;

    impl SimilarityKeyExtractor for FixedKeys {
        fn extract(&self, _text: &str) -> SimilarityKey {
            SimilarityKey {
                phone: "0900000000".to_string(),
                address: String::new(),
            }
        }
    }

    #[test]
    fn key_strategy_is_pluggable() {
        let fp = Fingerprinter::new(Arc::new(FixedKeys));
        let a = fp.fingerprint(&post("p1", "anything"));
        let b = fp.fingerprint(&post("p2", "something else"));
        assert_eq!(a.similarity, b.similarity);
        assert!(!a.similarity_is_trivial);
    }

    #[test]
    fn provenance_embeds_both_fingerprints() {
        let p = post("p1", "phòng đẹp");
        let fp = Fingerprinter::default();
        let prov = fp.provenance(&p);
        let prints = fp.fingerprint(&p);
        assert_eq!(prov.content_hash, prints.content);
        assert_eq!(prov.similarity_hash, prints.similarity);
        assert_eq!(prov.post, p);
    }
}
