//! Reconciliation and persistence of accepted extractions.
//!
//! Writes run strictly one at a time in orchestrator order. A new post is
//! written insert-only, so a row stored concurrently by another run is never
//! overwritten; a redelivery is a single-row create-or-update. A failed row is
//! recorded and the rest go on.
//! No transaction spans the batch, so partial completion is normal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use roomscout_common::{NewListing, RawPost, RoomScoutError, UpsertOutcome, ValidationMode};

use crate::batch::TaggedOutcome;
use crate::config::ReconcileConfig;
use crate::dedup::{Classified, DuplicateCheck};
use crate::extractor::{ExtractionOutcome, ListingFields};
use crate::fingerprint::Fingerprinter;
use crate::report::{PostError, SkippedDetail};
use crate::traits::ListingStore;

/// What happened to every accepted outcome.
#[derive(Debug, Clone, Default)]
pub struct SaveSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedDetail>,
    pub failed: Vec<PostError>,
}

impl SaveSummary {
    pub fn saved(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    fn skip(&mut self, legacy_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(legacy_id, reason = %reason, "Skipping save");
        self.skipped.push(SkippedDetail {
            fb_post_id: legacy_id.to_string(),
            reason,
        });
    }

    fn fail(&mut self, legacy_id: &str, error: RoomScoutError) {
        warn!(legacy_id, error = %error, "Failed to save listing");
        self.failed.push(PostError {
            fb_post_id: legacy_id.to_string(),
            error: error.detail(),
        });
    }
}

enum WritePlan {
    Create,
    /// Redelivery of a stored post: only the mutable subset changes.
    Update,
}

pub struct Reconciler {
    store: Arc<dyn ListingStore>,
    fingerprinter: Fingerprinter,
    config: ReconcileConfig,
    mode: ValidationMode,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ListingStore>,
        fingerprinter: Fingerprinter,
        config: ReconcileConfig,
        mode: ValidationMode,
    ) -> Self {
        Self {
            store,
            fingerprinter,
            config,
            mode,
        }
    }

    /// Persist accepted outcomes. `posts` are the classified posts the
    /// outcomes were extracted from.
    pub async fn persist(&self, outcomes: &[TaggedOutcome], posts: &[Classified]) -> SaveSummary {
        let mut by_id: HashMap<&str, &Classified> = HashMap::new();
        for classified in posts {
            by_id.entry(classified.post.legacy_id.as_str()).or_insert(classified);
        }

        let mut summary = SaveSummary::default();
        let mut written_this_run: HashSet<String> = HashSet::new();

        for tagged in outcomes {
            let fields = match &tagged.outcome {
                ExtractionOutcome::Accepted { fields } => fields,
                ExtractionOutcome::Rejected { .. } => continue,
            };

            let id = tagged.legacy_id.trim();
            if id.is_empty() {
                summary.skip("unknown", "Missing fbPostId");
                continue;
            }
            if !fields.satisfies(self.mode) {
                summary.skip(id, self.mode.rejection_reason());
                continue;
            }
            if !written_this_run.insert(id.to_string()) {
                summary.skip(id, "Duplicate identifier in batch");
                continue;
            }
            let Some(classified) = by_id.get(id) else {
                summary.fail(id, RoomScoutError::Input(format!("no source post for {id}")));
                continue;
            };

            let plan = match self.plan_write(id, &classified.check).await {
                Ok(Some(plan)) => plan,
                Ok(None) => {
                    summary.skip(id, RoomScoutError::Conflict(id.to_string()).detail());
                    continue;
                }
                Err(e) => {
                    summary.fail(id, e);
                    continue;
                }
            };

            let listing = match self.build_listing(&classified.post, fields) {
                Ok(listing) => listing,
                Err(e) => {
                    summary.fail(id, e);
                    continue;
                }
            };

            match plan {
                WritePlan::Create => match self.store.create_if_absent(&listing).await {
                    Ok(true) => summary.created.push(id.to_string()),
                    // Another writer stored this id after the re-check.
                    Ok(false) => summary.skip(id, RoomScoutError::Conflict(id.to_string()).detail()),
                    Err(e) => summary.fail(id, RoomScoutError::Database(e.to_string())),
                },
                WritePlan::Update => match self
                    .store
                    .create_or_update(&listing, &listing.update_fields())
                    .await
                {
                    Ok(UpsertOutcome::Created) => {
                        debug!(legacy_id = id, "Listing vanished before update, recreated");
                        summary.created.push(id.to_string());
                    }
                    Ok(UpsertOutcome::Updated) => summary.updated.push(id.to_string()),
                    Err(e) => summary.fail(id, RoomScoutError::Database(e.to_string())),
                },
            }
        }

        info!(
            created = summary.created.len(),
            updated = summary.updated.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Persistence complete"
        );
        summary
    }

    /// Re-check the store right before writing. `None` means the row exists
    /// but this post was not known to be a redelivery of it.
    async fn plan_write(
        &self,
        id: &str,
        check: &DuplicateCheck,
    ) -> Result<Option<WritePlan>, RoomScoutError> {
        let existing = self
            .store
            .find_by_key(id)
            .await
            .map_err(|e| RoomScoutError::Database(e.to_string()))?;

        Ok(match existing {
            None => Some(WritePlan::Create),
            Some(_) if check.is_redelivery_of(id) => Some(WritePlan::Update),
            Some(_) => None,
        })
    }

    /// Merge extracted fields with provenance and defaults.
    pub fn build_listing(
        &self,
        post: &RawPost,
        fields: &ListingFields,
    ) -> Result<NewListing, RoomScoutError> {
        let provenance = self.fingerprinter.provenance(post);
        let raw_fb_data = serde_json::to_value(&provenance)
            .map_err(|e| RoomScoutError::Validation(format!("unserializable provenance: {e}")))?;

        let district = fields.district.clone().unwrap_or_default();
        let title = match fields.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => placeholder_title(&district, &self.config.default_city),
        };

        Ok(NewListing {
            id: post.legacy_id.trim().to_string(),
            title,
            description: fields.description.clone().unwrap_or_default(),
            thumbnail: fields.images.first().cloned().unwrap_or_default(),
            address: fields.address.clone().unwrap_or_default(),
            district,
            ward: fields.ward.clone(),
            price: fields.price.unwrap_or(0),
            area: fields.area.unwrap_or(0.0),
            posted_by: fields.posted_by.clone(),
            posted_at: fields.posted_at.unwrap_or_else(Utc::now),
            fb_link: fields.fb_link.clone(),
            fb_group_name: fields.fb_group_name.clone(),
            coordinates: None,
            amenities: fields.amenities.clone(),
            rules: fields.rules.clone(),
            images: fields.images.clone(),
            contact_phone: fields.contact_phone.clone(),
            deposit_required: fields.deposit_required,
            utilities: fields.utilities.clone(),
            room_type: fields.room_type,
            available: true,
            raw_fb_data,
        })
    }
}

fn placeholder_title(district: &str, default_city: &str) -> String {
    let place = if district.trim().is_empty() {
        default_city
    } else {
        district.trim()
    };
    format!("Phòng trọ {place}")
}
