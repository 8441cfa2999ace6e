// Trait abstractions for the pipeline's external collaborators.
//
// ListingStore: key lookup, provenance lookup, keyed upsert or insert, soft delete.
// DatasetSource: resolves a dataset reference into undecoded scraper items.
//
// The completion capability lives in ai-client (`TextCompletion`). Together
// these let the whole pipeline run against in-memory doubles in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use apify_client::ApifyClient;
use roomscout_common::{Listing, ListingUpdate, NewListing, ProvenanceField, UpsertOutcome};

// ---------------------------------------------------------------------------
// ListingStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Listing whose primary key is the post's external identifier.
    async fn find_by_key(&self, id: &str) -> Result<Option<Listing>>;

    /// First listing whose provenance payload carries `value` under `field`,
    /// optionally restricted to rows created at or after `created_after`.
    async fn find_by_provenance_field(
        &self,
        field: ProvenanceField,
        value: &str,
        created_after: Option<DateTime<Utc>>,
    ) -> Result<Option<Listing>>;

    /// Create the row keyed by `create.id`, or apply `update` to it when it
    /// already exists. Single-row atomic.
    async fn create_or_update(
        &self,
        create: &NewListing,
        update: &ListingUpdate,
    ) -> Result<UpsertOutcome>;

    /// Insert `create` only when no row with its id exists. Returns false,
    /// leaving the stored row untouched, when one does.
    async fn create_if_absent(&self, create: &NewListing) -> Result<bool>;

    /// Mark a listing unavailable. Returns false when no such row exists.
    async fn soft_delete(&self, id: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// DatasetSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// All items of a scraper dataset as raw JSON, in dataset order.
    async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
impl DatasetSource for ApifyClient {
    async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self.facebook_group_posts(dataset_id).await?)
    }
}
