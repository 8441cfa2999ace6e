//! Duplicate classifier: three checks against previously stored listings.
//!
//! 1. External identifier already stored → exact
//! 2. Content fingerprint matches a stored provenance payload → exact
//! 3. Similarity fingerprint matches a listing created in the last 30 days,
//!    and the post has a contact phone or a key other than `||` → similar
//!
//! Checks short-circuit on the first match. Lookup failures fail open: the
//! post is classified `none` and flows on to extraction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use roomscout_common::{ProvenanceField, RawPost};

use crate::fingerprint::Fingerprinter;
use crate::traits::ListingStore;

/// Recency window for similar-duplicate matches.
pub const SIMILARITY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKind {
    None,
    Exact,
    Similar,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKind::None => write!(f, "none"),
            DuplicateKind::Exact => write!(f, "exact"),
            DuplicateKind::Similar => write!(f, "similar"),
        }
    }
}

/// Classification of one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCheck {
    pub kind: DuplicateKind,
    pub matched_id: Option<String>,
    pub reason: Option<String>,
}

impl DuplicateCheck {
    pub fn none() -> Self {
        Self {
            kind: DuplicateKind::None,
            matched_id: None,
            reason: None,
        }
    }

    fn none_because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::none()
        }
    }

    fn matched(kind: DuplicateKind, matched_id: String, reason: String) -> Self {
        Self {
            kind,
            matched_id: Some(matched_id),
            reason: Some(reason),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind != DuplicateKind::None
    }

    /// Matched by external identifier: a redelivery of a post already stored.
    pub fn is_redelivery_of(&self, legacy_id: &str) -> bool {
        self.kind == DuplicateKind::Exact && self.matched_id.as_deref() == Some(legacy_id)
    }
}

/// Which duplicate kinds are dropped before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupOptions {
    pub skip_exact: bool,
    pub skip_similar: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            skip_exact: true,
            skip_similar: false,
        }
    }
}

impl DedupOptions {
    fn skips(&self, kind: DuplicateKind) -> bool {
        match kind {
            DuplicateKind::Exact => self.skip_exact,
            DuplicateKind::Similar => self.skip_similar,
            DuplicateKind::None => false,
        }
    }
}

/// A post together with its classification.
#[derive(Debug, Clone)]
pub struct Classified {
    pub post: RawPost,
    pub check: DuplicateCheck,
}

/// Output of [`DuplicateClassifier::partition`]. Both lists keep input order.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Posts that go on to extraction.
    pub unique: Vec<Classified>,
    /// Posts dropped per the options.
    pub duplicates: Vec<Classified>,
}

impl Partition {
    pub fn count(&self, kind: DuplicateKind) -> usize {
        self.duplicates.iter().filter(|d| d.check.kind == kind).count()
    }
}

pub struct DuplicateClassifier {
    store: Arc<dyn ListingStore>,
    fingerprinter: Fingerprinter,
    window: Duration,
}

impl DuplicateClassifier {
    pub fn new(store: Arc<dyn ListingStore>, fingerprinter: Fingerprinter) -> Self {
        Self {
            store,
            fingerprinter,
            window: Duration::days(SIMILARITY_WINDOW_DAYS),
        }
    }

    /// Classify one post against the store. Read-only.
    pub async fn classify(&self, post: &RawPost) -> DuplicateCheck {
        let id = post.legacy_id.trim();
        if id.is_empty() {
            return DuplicateCheck::none_because("missing identifier");
        }

        match self.store.find_by_key(id).await {
            Ok(Some(existing)) => {
                return DuplicateCheck::matched(
                    DuplicateKind::Exact,
                    existing.id,
                    format!("Post already exists with ID {id}"),
                )
            }
            Ok(None) => {}
            Err(e) => return fail_open(id, "key", e),
        }

        let prints = self.fingerprinter.fingerprint(post);

        match self
            .store
            .find_by_provenance_field(ProvenanceField::ContentHash, &prints.content, None)
            .await
        {
            Ok(Some(existing)) => {
                return DuplicateCheck::matched(
                    DuplicateKind::Exact,
                    existing.id,
                    "Duplicate content detected (same text + user + group)".to_string(),
                )
            }
            Ok(None) => {}
            Err(e) => return fail_open(id, "content fingerprint", e),
        }

        if post.contact_phone().is_none() && prints.similarity_is_trivial {
            debug!(legacy_id = id, "Similarity key empty, skipping similarity check");
            return DuplicateCheck::none();
        }

        let since = Utc::now() - self.window;
        match self
            .store
            .find_by_provenance_field(ProvenanceField::SimilarityHash, &prints.similarity, Some(since))
            .await
        {
            Ok(Some(existing)) => DuplicateCheck::matched(
                DuplicateKind::Similar,
                existing.id,
                format!(
                    "Similar listing found (same phone/address) - {}",
                    existing.title
                ),
            ),
            Ok(None) => DuplicateCheck::none(),
            Err(e) => fail_open(id, "similarity fingerprint", e),
        }
    }

    /// Classify every post concurrently and split them per `options`.
    ///
    /// Posts the store knows nothing about are also compared with earlier
    /// posts of the same batch: equal content under a different identifier
    /// is an exact duplicate of the first occurrence.
    pub async fn partition(&self, posts: Vec<RawPost>, options: DedupOptions) -> Partition {
        let checks = join_all(posts.iter().map(|post| self.classify(post))).await;

        let mut first_by_content: HashMap<String, String> = HashMap::new();
        let mut partition = Partition::default();
        for (post, mut check) in posts.into_iter().zip(checks) {
            let content = self.fingerprinter.fingerprint(&post).content;
            match first_by_content.get(&content) {
                Some(first_id) if check.kind == DuplicateKind::None && *first_id != post.legacy_id => {
                    check = DuplicateCheck::matched(
                        DuplicateKind::Exact,
                        first_id.clone(),
                        "Duplicate content within batch (same text + user + group)".to_string(),
                    );
                }
                Some(_) => {}
                None => {
                    first_by_content.insert(content, post.legacy_id.clone());
                }
            }

            let entry = Classified { post, check };
            if entry.check.is_duplicate() && options.skips(entry.check.kind) {
                partition.duplicates.push(entry);
            } else {
                partition.unique.push(entry);
            }
        }

        info!(
            unique = partition.unique.len(),
            exact = partition.count(DuplicateKind::Exact),
            similar = partition.count(DuplicateKind::Similar),
            "Duplicate classification complete"
        );
        partition
    }
}

fn fail_open(id: &str, check: &str, error: anyhow::Error) -> DuplicateCheck {
    warn!(legacy_id = id, check, error = %error, "Duplicate lookup failed, treating post as new");
    DuplicateCheck::none()
}
